use cranelift_codegen::settings::SetError;
use thiserror::Error;

/// Errors raised while generating or loading native code.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftGen(#[from] cranelift_codegen::CodegenError),

    #[error("Failed during module processing: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Failed to configure Cranelift settings: {0}")]
    Settings(#[from] SetError),

    #[error("Unsupported host architecture: {0}")]
    UnsupportedHost(String),
}
