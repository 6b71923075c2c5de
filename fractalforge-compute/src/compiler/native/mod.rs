//! Native execution strategy: resolved programs JIT-compiled with Cranelift.

mod codegen;
mod context;
mod error;

pub use context::NativeContext;
pub use error::NativeError;

use super::ir::{ColorIr, OrbitIr, StateSlot, BUILTIN_REGISTERS, N, W, X};
use crate::runtime::{ColorProgram, OrbitOutcome, OrbitProgram, ProgramState};
use codegen::Codegen;
use context::Entry;
use cranelift_jit::JITModule;
use cranelift_module::FuncId;
use fractalforge_core::{Color, ComplexNumber, EvaluationError, Region, Scope};
use std::sync::Arc;

/// True when Cranelift supports the host ISA.
pub fn is_host_supported() -> bool {
    cranelift_native::builder().is_ok()
}

/// Owner of the executable memory behind every entry point of one compile.
struct JitMemory {
    module: Option<JITModule>,
}

// SAFETY: the module is only touched again when it is dropped; the
// finalized code it owns is immutable and callable from any thread.
unsafe impl Send for JitMemory {}
unsafe impl Sync for JitMemory {}

impl Drop for JitMemory {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: entry points are only reachable through `Arc`s to this
            // value, so none can run once it is dropped.
            unsafe { module.free_memory() };
        }
    }
}

fn entry(module: &JITModule, id: FuncId) -> Entry {
    let pointer = module.get_finalized_function(id);
    // SAFETY: every function defined by `Codegen::define` has this signature.
    unsafe { std::mem::transmute::<*const u8, Entry>(pointer) }
}

/// Run `entry` against the instance state. The context is rebuilt per call
/// so the register pointer never outlives a borrow of the pool.
fn call(entry: Entry, state: &mut ProgramState) -> (i32, NativeContext) {
    let mut ctx = NativeContext::new(state);
    // SAFETY: the context points into `state`, which outlives the call, and
    // the generated code only addresses registers the resolver allocated.
    let status = unsafe { entry(&mut ctx) };
    (status, ctx)
}

/// Orbit and color programs from one native compile.
pub struct NativePrograms {
    pub orbit: NativeOrbit,
    pub color: NativeColor,
    /// Cranelift IR of every generated function.
    pub ir: String,
}

pub(crate) fn compile(orbit: &OrbitIr, color: &ColorIr) -> Result<NativePrograms, NativeError> {
    let mut codegen = Codegen::new()?;

    let orbit_prelude = codegen.define("orbit_prelude", |e| e.plain(&orbit.prelude))?;
    let orbit_begin = codegen.define("orbit_begin", |e| e.plain(&orbit.begin))?;
    let orbit_step = codegen.define("orbit_step", |e| e.step(&orbit.body, &orbit.condition))?;
    let orbit_end = codegen.define("orbit_end", |e| e.plain(&orbit.end))?;
    let color_prelude = codegen.define("color_prelude", |e| e.plain(&color.prelude))?;
    let color_init = codegen.define("color_init", |e| e.plain(&color.init))?;
    let color_shade = codegen.define("color_shade", |e| e.shade(&color.background, &color.rules))?;

    codegen.module.finalize_definitions()?;
    let ir = codegen.ir().to_string();
    let module = &codegen.module;

    let orbit_code = NativeOrbitCode {
        prelude: entry(module, orbit_prelude),
        begin: entry(module, orbit_begin),
        step: entry(module, orbit_step),
        end: entry(module, orbit_end),
        loop_begin: orbit.loop_begin,
        loop_end: orbit.loop_end,
        pure_start: orbit.pure_start,
        states: orbit.states.clone(),
        region: orbit.region,
        uses_time: orbit.uses_time,
        conjugation_symmetric: orbit.conjugation_symmetric,
    };
    let color_code = NativeColorCode {
        prelude: entry(module, color_prelude),
        init: entry(module, color_init),
        shade: entry(module, color_shade),
        imports: color.imports.clone(),
        palette_names: color.palette_names.clone(),
        pure_start: color.pure_start,
        uses_time: color.uses_time,
        conjugation_symmetric: color.conjugation_symmetric,
    };

    let memory = Arc::new(JitMemory {
        module: Some(codegen.module),
    });
    Ok(NativePrograms {
        orbit: NativeOrbit {
            code: Arc::new(orbit_code),
            _memory: Arc::clone(&memory),
            state: ProgramState::new(
                orbit.registers,
                Arc::from(orbit.traps.clone()),
                Arc::from(Vec::new()),
            ),
        },
        color: NativeColor {
            code: Arc::new(color_code),
            _memory: memory,
            state: ProgramState::new(
                color.registers,
                Arc::from(color.traps.clone()),
                Arc::from(color.palettes.clone()),
            ),
        },
        ir,
    })
}

// ============================================================================
// Orbit program
// ============================================================================

struct NativeOrbitCode {
    prelude: Entry,
    begin: Entry,
    step: Entry,
    end: Entry,
    loop_begin: u32,
    loop_end: u32,
    pure_start: usize,
    states: Scope,
    region: Region,
    uses_time: bool,
    conjugation_symmetric: bool,
}

#[derive(Clone)]
pub struct NativeOrbit {
    code: Arc<NativeOrbitCode>,
    _memory: Arc<JitMemory>,
    state: ProgramState,
}

impl OrbitProgram for NativeOrbit {
    fn init(&mut self) {
        call(self.code.prelude, &mut self.state);
    }

    fn region(&self) -> Region {
        self.code.region
    }

    fn set_time(&mut self, time: f64) {
        self.state.time = time;
        if self.code.uses_time {
            self.init();
        }
    }

    fn set_julia(&mut self, julia: bool) {
        self.state.julia = julia;
    }

    fn is_julia(&self) -> bool {
        self.state.julia
    }

    fn set_point(&mut self, point: ComplexNumber) {
        self.state.point = point;
    }

    fn point(&self) -> ComplexNumber {
        self.state.point
    }

    fn render(
        &mut self,
        x: ComplexNumber,
        w: ComplexNumber,
        states: &mut [ComplexNumber],
        mut trace: Option<&mut Vec<Vec<ComplexNumber>>>,
    ) -> Result<OrbitOutcome, EvaluationError> {
        let code = &self.code;
        let state = &mut self.state;
        state
            .pool
            .reset_range(BUILTIN_REGISTERS as usize, code.pure_start);
        state.pool.set(X, x);
        state.pool.set(W, w);
        state.pool.set(N, ComplexNumber::real(code.loop_begin as f64));

        call(code.begin, state);

        let mut outcome = OrbitOutcome {
            iterations: code.loop_end,
            escaped: false,
        };
        for i in code.loop_begin.saturating_add(1)..=code.loop_end {
            state.pool.set(N, ComplexNumber::real(i as f64));
            let (status, _) = call(code.step, state);
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(state.snapshot(&code.states));
            }
            if status != 0 {
                outcome = OrbitOutcome {
                    iterations: i,
                    escaped: true,
                };
                break;
            }
        }

        call(code.end, state);
        state.export_states(&code.states, states);
        Ok(outcome)
    }

    fn use_time(&self) -> bool {
        self.code.uses_time
    }

    fn state_len(&self) -> usize {
        self.code.states.len()
    }

    fn loop_end(&self) -> u32 {
        self.code.loop_end
    }

    fn is_conjugation_symmetric(&self) -> bool {
        self.code.conjugation_symmetric
    }
}

// ============================================================================
// Color program
// ============================================================================

struct NativeColorCode {
    prelude: Entry,
    init: Entry,
    shade: Entry,
    imports: Vec<StateSlot>,
    palette_names: Vec<String>,
    pure_start: usize,
    uses_time: bool,
    conjugation_symmetric: bool,
}

#[derive(Clone)]
pub struct NativeColor {
    code: Arc<NativeColorCode>,
    _memory: Arc<JitMemory>,
    state: ProgramState,
}

impl ColorProgram for NativeColor {
    fn init(&mut self) {
        call(self.code.prelude, &mut self.state);
    }

    fn set_time(&mut self, time: f64) {
        self.state.time = time;
        if self.code.uses_time {
            self.init();
        }
    }

    fn set_julia(&mut self, julia: bool) {
        self.state.julia = julia;
    }

    fn render(&mut self, states: &[ComplexNumber]) -> Result<Color, EvaluationError> {
        let code = &self.code;
        let state = &mut self.state;
        state.pool.reset_range(0, code.pure_start);
        state.import_states(&code.imports, states)?;
        call(code.init, state);

        match call(code.shade, state) {
            (0, ctx) => Ok(Color(ctx.accumulator)),
            (1, ctx) => Err(EvaluationError::NonFiniteIndex {
                palette: code
                    .palette_names
                    .get(ctx.error_palette as usize)
                    .cloned()
                    .unwrap_or_default(),
                index: ctx.error_index,
            }),
            (status, _) => Err(EvaluationError::Native(status)),
        }
    }

    fn use_time(&self) -> bool {
        self.code.uses_time
    }

    fn is_conjugation_symmetric(&self) -> bool {
        self.code.conjugation_symmetric
    }
}
