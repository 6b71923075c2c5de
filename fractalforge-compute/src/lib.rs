pub mod cancellation;
pub mod compiler;
pub mod coordinator;
pub mod renderer;
pub mod runtime;

pub use cancellation::{AbortSignal, AtomicBoolChecker, CancellationChecker, NeverCancel};
pub use compiler::{
    CompileError, CompiledFractal, CompilerCapabilities, ProgramCompiler, Strategy,
};
pub use coordinator::{Coordinator, RenderOutput};
pub use renderer::{
    ProgressListener, RenderError, RenderParameters, RenderState, Renderer, RendererStrategy,
};
pub use runtime::{
    ColorFactory, ColorProgram, OrbitFactory, OrbitOutcome, OrbitProgram, PrototypeFactory,
};

// Re-export core types for convenience
pub use fractalforge_core::*;
