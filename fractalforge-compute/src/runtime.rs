//! Contract between compiled programs and the renderer.
//!
//! A compiled fractal is a pair of factories. Every worker thread asks the
//! factories for its own program instances; an instance owns its register
//! pool and is never shared. The orbit program iterates one pixel and exports
//! its state vector, the color program turns that vector into a color.

use crate::compiler::ir::StateSlot;
use dyn_clone::DynClone;
use fractalforge_core::{
    Color, ComplexNumber, EvaluationError, NumberPool, Palette, Region, Scope, Trap,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of iterating one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrbitOutcome {
    /// Iteration at which the orbit escaped or stopped, else the loop end.
    pub iterations: u32,
    pub escaped: bool,
}

// ============================================================================
// Program traits
// ============================================================================

pub trait OrbitProgram: DynClone + Send {
    /// Evaluate pure variables. Must run before the first `render`.
    fn init(&mut self);

    /// Complex region the orbit declares as its natural view.
    fn region(&self) -> Region;

    fn set_time(&mut self, time: f64);

    fn set_julia(&mut self, julia: bool);

    fn is_julia(&self) -> bool;

    fn set_point(&mut self, point: ComplexNumber);

    fn point(&self) -> ComplexNumber;

    /// Iterate with explicit builtins `x` and `w`, writing the exported state
    /// into `states` (which must hold `state_len()` values). When `trace` is
    /// given, a copy of the state is appended after every iteration.
    fn render(
        &mut self,
        x: ComplexNumber,
        w: ComplexNumber,
        states: &mut [ComplexNumber],
        trace: Option<&mut Vec<Vec<ComplexNumber>>>,
    ) -> Result<OrbitOutcome, EvaluationError>;

    /// Iterate the pixel at `pixel`: in Julia mode `x` is the pixel and `w`
    /// the configured point, otherwise the roles swap.
    fn render_pixel(
        &mut self,
        pixel: ComplexNumber,
        states: &mut [ComplexNumber],
        trace: Option<&mut Vec<Vec<ComplexNumber>>>,
    ) -> Result<OrbitOutcome, EvaluationError> {
        let point = self.point();
        if self.is_julia() {
            self.render(pixel, point, states, trace)
        } else {
            self.render(point, pixel, states, trace)
        }
    }

    fn use_time(&self) -> bool;

    fn state_len(&self) -> usize;

    fn loop_end(&self) -> u32;

    /// True when `render(conj(x), conj(w))` yields the conjugate state.
    fn is_conjugation_symmetric(&self) -> bool;
}

dyn_clone::clone_trait_object!(OrbitProgram);

pub trait ColorProgram: DynClone + Send {
    fn init(&mut self);

    fn set_time(&mut self, time: f64);

    fn set_julia(&mut self, julia: bool);

    /// Color of one pixel from the orbit state vector.
    fn render(&mut self, states: &[ComplexNumber]) -> Result<Color, EvaluationError>;

    fn use_time(&self) -> bool;

    fn is_conjugation_symmetric(&self) -> bool;
}

dyn_clone::clone_trait_object!(ColorProgram);

// ============================================================================
// Factories
// ============================================================================

pub trait OrbitFactory: Send + Sync {
    fn create(&self) -> Box<dyn OrbitProgram>;
}

pub trait ColorFactory: Send + Sync {
    fn create(&self) -> Box<dyn ColorProgram>;
}

/// Hands out clones of an initialized prototype.
pub struct PrototypeFactory<P: ?Sized> {
    prototype: Mutex<Box<P>>,
}

impl<P: ?Sized> PrototypeFactory<P> {
    pub fn new(prototype: Box<P>) -> Self {
        Self {
            prototype: Mutex::new(prototype),
        }
    }
}

impl OrbitFactory for PrototypeFactory<dyn OrbitProgram> {
    fn create(&self) -> Box<dyn OrbitProgram> {
        dyn_clone::clone_box(&**self.prototype.lock())
    }
}

impl ColorFactory for PrototypeFactory<dyn ColorProgram> {
    fn create(&self) -> Box<dyn ColorProgram> {
        dyn_clone::clone_box(&**self.prototype.lock())
    }
}

// ============================================================================
// Per-instance state
// ============================================================================

/// Mutable state every program instance carries next to its code.
#[derive(Clone, Debug)]
pub struct ProgramState {
    pub pool: NumberPool,
    pub time: f64,
    pub julia: bool,
    /// Fixed point of the Julia set, or the starting point in Mandelbrot mode.
    pub point: ComplexNumber,
    pub traps: Arc<[Trap]>,
    pub palettes: Arc<[Palette]>,
}

impl ProgramState {
    pub fn new(registers: usize, traps: Arc<[Trap]>, palettes: Arc<[Palette]>) -> Self {
        Self {
            pool: NumberPool::with_capacity(registers),
            time: 0.0,
            julia: false,
            point: ComplexNumber::ZERO,
            traps,
            palettes,
        }
    }

    /// Copy the orbit's exported variables into `states`, by position.
    pub fn export_states(&self, scope: &Scope, states: &mut [ComplexNumber]) {
        for (slot, variable) in states.iter_mut().zip(scope.iter()) {
            *slot = self.pool.get(variable.handle);
        }
    }

    pub fn snapshot(&self, scope: &Scope) -> Vec<ComplexNumber> {
        scope.iter().map(|v| self.pool.get(v.handle)).collect()
    }

    /// Load the orbit state vector into the color program's import registers.
    pub fn import_states(
        &mut self,
        imports: &[StateSlot],
        states: &[ComplexNumber],
    ) -> Result<(), EvaluationError> {
        for slot in imports {
            let value = *states
                .get(slot.position)
                .ok_or(EvaluationError::UnknownSlot {
                    position: slot.position,
                    available: states.len(),
                })?;
            if slot.real && !value.is_real() {
                return Err(EvaluationError::NotReal {
                    name: slot.name.clone(),
                    value,
                });
            }
            self.pool.set(slot.handle, value);
        }
        Ok(())
    }
}

/// Step-indexed palette lookup shared by both execution strategies.
pub fn palette_color(palette: &Palette, name: &str, index: f64) -> Result<Color, EvaluationError> {
    if !index.is_finite() {
        return Err(EvaluationError::NonFiniteIndex {
            palette: name.to_string(),
            index,
        });
    }
    Ok(palette.color_at_step(index))
}

/// Color built from real channel values.
pub fn color_from_components(alpha: f64, red: f64, green: f64, blue: f64) -> Color {
    Color::new(alpha as f32, red as f32, green as f32, blue as f32)
}
