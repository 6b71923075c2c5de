//! Program compiler: AST in, a pair of program factories out.
//!
//! Both strategies share the resolution pass in [`resolve`]; they only
//! differ in how the resolved IR is executed.

pub mod interpreter;
pub mod ir;
#[cfg(feature = "jit")]
pub mod native;
mod resolve;

use crate::runtime::{ColorFactory, ColorProgram, OrbitFactory, OrbitProgram, PrototypeFactory};
use fractalforge_core::{AstFractal, CompilerVariable, Diagnostic, ParseOutcome};
use interpreter::{InterpretedColor, InterpretedOrbit};
use ir::{ColorIr, OrbitIr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Interpreter,
    Native,
}

/// What the running process can compile to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompilerCapabilities {
    pub native: bool,
}

impl CompilerCapabilities {
    /// Native code is available when the `jit` feature is built in and
    /// Cranelift supports the host.
    pub fn detect() -> Self {
        #[cfg(feature = "jit")]
        let native = native::is_host_supported();
        #[cfg(not(feature = "jit"))]
        let native = false;
        Self { native }
    }

    pub fn interpreter_only() -> Self {
        Self { native: false }
    }
}

impl Default for CompilerCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parsing failed with {} error(s)", .0.len())]
    Parse(Vec<Diagnostic>),

    #[error("compilation failed with {} error(s)", .0.len())]
    Invalid(Vec<Diagnostic>),

    #[cfg(feature = "jit")]
    #[error("native code generation failed: {source}")]
    Native {
        location: fractalforge_core::SourceLocation,
        #[source]
        source: native::NativeError,
    },
}

impl CompileError {
    /// Structured records for every problem behind this error.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CompileError::Parse(errors) | CompileError::Invalid(errors) => errors.clone(),
            #[cfg(feature = "jit")]
            CompileError::Native { location, source } => {
                vec![Diagnostic::compile(*location, source.to_string())]
            }
        }
    }
}

/// Factories of one compiled fractal. Cheap to clone.
#[derive(Clone)]
pub struct CompiledFractal {
    pub orbit: Arc<dyn OrbitFactory>,
    pub color: Arc<dyn ColorFactory>,
    /// Strategy that was actually used.
    pub strategy: Strategy,
    /// Non-fatal findings of the compile.
    pub diagnostics: Vec<Diagnostic>,
    /// Orbit variables with their classification and registers.
    pub variables: Vec<CompilerVariable>,
    uses_time: bool,
    generated: Option<String>,
}

impl CompiledFractal {
    /// Whether either program reads `time`.
    pub fn use_time(&self) -> bool {
        self.uses_time
    }

    /// Cranelift IR of the generated functions, for native compiles.
    pub fn emit_ir(&self) -> Option<&str> {
        self.generated.as_deref()
    }
}

pub struct ProgramCompiler {
    capabilities: CompilerCapabilities,
}

impl Default for ProgramCompiler {
    fn default() -> Self {
        Self::new(CompilerCapabilities::detect())
    }
}

impl ProgramCompiler {
    pub fn new(capabilities: CompilerCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn is_native_available(&self) -> bool {
        self.capabilities.native
    }

    /// Compile the output of the external parser. Parse errors abort.
    pub fn compile_parsed(
        &self,
        outcome: ParseOutcome,
        strategy: Strategy,
    ) -> Result<CompiledFractal, CompileError> {
        match outcome.fractal {
            Some(fractal) if outcome.errors.is_empty() => self.compile(&fractal, strategy),
            _ => Err(CompileError::Parse(outcome.errors)),
        }
    }

    pub fn compile(
        &self,
        fractal: &AstFractal,
        strategy: Strategy,
    ) -> Result<CompiledFractal, CompileError> {
        let orbit = resolve::resolve_orbit(&fractal.orbit);
        let color = match &orbit {
            Ok(orbit) => resolve::resolve_color(&fractal.color, orbit),
            // Without an orbit there are no state slots to check the color against.
            Err(_) => Err(Vec::new()),
        };
        let (orbit, color) = match (orbit, color) {
            (Ok(orbit), Ok(color)) => (orbit, color),
            (orbit, color) => {
                let mut errors = orbit.err().unwrap_or_default();
                errors.extend(color.err().unwrap_or_default());
                log::debug!("compile rejected with {} error(s)", errors.len());
                return Err(CompileError::Invalid(errors));
            }
        };

        let strategy = match strategy {
            Strategy::Native if self.is_native_available() => Strategy::Native,
            _ => Strategy::Interpreter,
        };
        log::debug!(
            "compiling with {:?}: {} orbit registers ({} pure), {} color registers, {} rule(s)",
            strategy,
            orbit.registers,
            orbit.registers - orbit.pure_start,
            color.registers,
            color.rules.len()
        );

        let uses_time = orbit.uses_time || color.uses_time;
        let variables = orbit.variables.clone();
        let (orbit_program, color_program, generated) = match strategy {
            Strategy::Interpreter => interpret(&orbit, &color),
            #[cfg(feature = "jit")]
            Strategy::Native => {
                let programs =
                    native::compile(&orbit, &color).map_err(|source| CompileError::Native {
                        location: fractal.orbit.location,
                        source,
                    })?;
                let orbit: Box<dyn OrbitProgram> = Box::new(programs.orbit);
                let color: Box<dyn ColorProgram> = Box::new(programs.color);
                (orbit, color, Some(programs.ir))
            }
            #[cfg(not(feature = "jit"))]
            Strategy::Native => interpret(&orbit, &color),
        };

        Ok(CompiledFractal {
            orbit: Arc::new(PrototypeFactory::new(prepare_orbit(orbit_program))),
            color: Arc::new(PrototypeFactory::new(prepare_color(color_program))),
            strategy,
            diagnostics: Vec::new(),
            variables,
            uses_time,
            generated,
        })
    }
}

fn interpret(
    orbit: &OrbitIr,
    color: &ColorIr,
) -> (Box<dyn OrbitProgram>, Box<dyn ColorProgram>, Option<String>) {
    (
        Box::new(InterpretedOrbit::new(orbit)),
        Box::new(InterpretedColor::new(color)),
        None,
    )
}

fn prepare_orbit(mut program: Box<dyn OrbitProgram>) -> Box<dyn OrbitProgram> {
    program.init();
    program
}

fn prepare_color(mut program: Box<dyn ColorProgram>) -> Box<dyn ColorProgram> {
    program.init();
    program
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractalforge_core::{ComplexNumber, DiagnosticKind, Expression, SourceLocation, Statement};

    #[test]
    fn interpreter_is_always_available() {
        let compiler = ProgramCompiler::new(CompilerCapabilities::interpreter_only());
        assert!(!compiler.is_native_available());

        let compiled = compiler
            .compile(&AstFractal::mandelbrot(50), Strategy::Native)
            .unwrap();
        assert_eq!(compiled.strategy, Strategy::Interpreter, "silent fallback");
        assert!(compiled.emit_ir().is_none());
        assert!(!compiled.use_time());
    }

    #[test]
    fn factories_hand_out_independent_instances() {
        let compiled = ProgramCompiler::default()
            .compile(&AstFractal::mandelbrot(50), Strategy::Interpreter)
            .unwrap();
        let mut first = compiled.orbit.create();
        let mut second = compiled.orbit.create();
        first.set_julia(true);
        assert!(!second.is_julia());

        let mut states = vec![ComplexNumber::ZERO; second.state_len()];
        let outcome = second
            .render_pixel(ComplexNumber::new(1.0, 1.0), &mut states, None)
            .unwrap();
        assert!(outcome.escaped);
    }

    #[test]
    fn orbit_errors_skip_color_checks() {
        let mut fractal = AstFractal::mandelbrot(50);
        fractal.orbit.begin.push(
            Statement::assign("a", Expression::var("nowhere"))
                .at(SourceLocation::new(3, 7, 40, 7)),
        );
        fractal.color.rules[0].opacity = Expression::var("x");

        let error = ProgramCompiler::default()
            .compile(&fractal, Strategy::Interpreter)
            .err()
            .unwrap();
        let diagnostics = error.diagnostics();
        assert!(matches!(error, CompileError::Invalid(_)));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Compile);
        assert_eq!(diagnostics[0].message, "unknown variable `nowhere`");
    }

    #[test]
    fn parse_errors_abort_compilation() {
        let outcome = ParseOutcome::failed(vec![Diagnostic::parse(
            SourceLocation::new(1, 1, 0, 1),
            "unexpected token",
        )]);
        let error = ProgramCompiler::default()
            .compile_parsed(outcome, Strategy::Interpreter)
            .err()
            .unwrap();
        assert!(matches!(error, CompileError::Parse(ref errors) if errors.len() == 1));
        assert_eq!(error.to_string(), "parsing failed with 1 error(s)");
    }
}
