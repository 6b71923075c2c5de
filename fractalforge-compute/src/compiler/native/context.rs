//! Memory shared between generated code and the runtime, and the `extern "C"`
//! helpers generated code calls into.
//!
//! Transcendental functions, trap tests and color handling are not inlined:
//! the helpers run the same Rust code as the interpreter, so both strategies
//! produce identical bits.

use crate::runtime::{color_from_components, palette_color, ProgramState};
use fractalforge_core::{Color, ComplexNumber, Function, Palette, Trap};
use std::slice;

/// Entry point of every generated function. Returns a status code.
pub(super) type Entry = unsafe extern "C" fn(*mut NativeContext) -> i32;

/// Per-call context passed to generated code. Field offsets are baked into
/// the generated loads and stores.
#[repr(C)]
pub struct NativeContext {
    /// Register file, two `f64`s per register.
    pub registers: *mut f64,
    pub time: f64,
    pub traps: *const Trap,
    pub trap_count: usize,
    pub palettes: *const Palette,
    pub palette_count: usize,
    /// Output of the last complex helper call.
    pub result: [f64; 2],
    pub accumulator: [f32; 4],
    pub scratch: [f32; 4],
    /// Palette and index of a failed palette lookup.
    pub error_palette: u32,
    pub error_index: f64,
}

impl NativeContext {
    pub fn new(state: &mut ProgramState) -> Self {
        Self {
            registers: state.pool.as_mut_ptr(),
            time: state.time,
            traps: state.traps.as_ptr(),
            trap_count: state.traps.len(),
            palettes: state.palettes.as_ptr(),
            palette_count: state.palettes.len(),
            result: [0.0; 2],
            accumulator: [0.0; 4],
            scratch: [0.0; 4],
            error_palette: 0,
            error_index: 0.0,
        }
    }

    fn traps(&self) -> &[Trap] {
        // SAFETY: built from a live `Arc<[Trap]>` owned by the calling instance.
        unsafe { slice::from_raw_parts(self.traps, self.trap_count) }
    }

    fn palettes(&self) -> &[Palette] {
        // SAFETY: as for `traps`.
        unsafe { slice::from_raw_parts(self.palettes, self.palette_count) }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) extern "C" fn ff_real(id: u32, a: f64, b: f64) -> f64 {
    Function::from_id(id).map_or(f64::NAN, |f| f.apply_real(a, b))
}

pub(super) unsafe extern "C" fn ff_complex(
    ctx: *mut NativeContext,
    id: u32,
    a_re: f64,
    a_im: f64,
    b_re: f64,
    b_im: f64,
) {
    let ctx = &mut *ctx;
    let z = Function::from_id(id).map_or(ComplexNumber::new(f64::NAN, f64::NAN), |f| {
        f.apply_complex(ComplexNumber::new(a_re, a_im), ComplexNumber::new(b_re, b_im))
    });
    ctx.result = [z.re, z.im];
}

pub(super) unsafe extern "C" fn ff_trap(ctx: *mut NativeContext, index: u32, re: f64, im: f64) -> i32 {
    let ctx = &*ctx;
    ctx.traps()
        .get(index as usize)
        .is_some_and(|trap| trap.contains(ComplexNumber::new(re, im))) as i32
}

pub(super) unsafe extern "C" fn ff_color_components(
    ctx: *mut NativeContext,
    alpha: f64,
    red: f64,
    green: f64,
    blue: f64,
) {
    (*ctx).scratch = color_from_components(alpha, red, green, blue).0;
}

/// Writes the palette color into `scratch`; returns 1 and records the
/// failing lookup when the index is not finite.
pub(super) unsafe extern "C" fn ff_color_palette(ctx: *mut NativeContext, palette: u32, index: f64) -> i32 {
    let ctx = &mut *ctx;
    let color = match ctx.palettes().get(palette as usize) {
        Some(p) => palette_color(p, "", index),
        None => Ok(Color::TRANSPARENT),
    };
    match color {
        Ok(color) => {
            ctx.scratch = color.0;
            0
        }
        Err(_) => {
            ctx.error_palette = palette;
            ctx.error_index = index;
            1
        }
    }
}

pub(super) unsafe extern "C" fn ff_color_base(ctx: *mut NativeContext) {
    let ctx = &mut *ctx;
    ctx.accumulator = ctx.scratch;
}

pub(super) unsafe extern "C" fn ff_color_blend(ctx: *mut NativeContext, opacity: f64) {
    let ctx = &mut *ctx;
    let mut color = Color(ctx.accumulator);
    color.blend(&Color(ctx.scratch), opacity as f32);
    ctx.accumulator = color.0;
}

/// Symbols generated code links against.
pub(super) fn symbols() -> [(&'static str, *const u8); 7] {
    [
        ("ff_real", ff_real as *const u8),
        ("ff_complex", ff_complex as *const u8),
        ("ff_trap", ff_trap as *const u8),
        ("ff_color_components", ff_color_components as *const u8),
        ("ff_color_palette", ff_color_palette as *const u8),
        ("ff_color_base", ff_color_base as *const u8),
        ("ff_color_blend", ff_color_blend as *const u8),
    ]
}
