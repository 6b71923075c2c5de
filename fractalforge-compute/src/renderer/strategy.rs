use crate::runtime::{ColorProgram, OrbitProgram};
use fractalforge_core::{PixelMapper, RenderHints, RendererKind};

/// Optimizations a render may apply, decided once per render request from
/// the hints and the programs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStrategy {
    solid_guess: bool,
    vertical_symmetry: bool,
}

impl RendererStrategy {
    pub fn new(
        hints: &RenderHints,
        orbit: &dyn OrbitProgram,
        color: &dyn ColorProgram,
        mapper: &PixelMapper,
    ) -> Self {
        let realtime = hints.kind == RendererKind::Realtime;
        let symmetric = orbit.is_conjugation_symmetric()
            && color.is_conjugation_symmetric()
            && orbit.point().im == 0.0
            && !mapper.is_rotated();
        Self {
            solid_guess: realtime,
            vertical_symmetry: realtime && symmetric,
        }
    }

    /// Plain evaluation of every pixel.
    pub fn exhaustive() -> Self {
        Self::default()
    }

    pub fn is_solid_guess_supported(&self) -> bool {
        self.solid_guess
    }

    /// Mirror across the real axis.
    pub fn is_vertical_symmetry_supported(&self) -> bool {
        self.vertical_symmetry
    }

    /// Imaginary-axis symmetry is never detected.
    pub fn is_horizontal_symmetry_supported(&self) -> bool {
        false
    }
}

/// Rows of a buffer that are copied from their mirror image instead of
/// being evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mirror {
    /// Twice the axis row; integral by construction.
    axis2: i64,
    /// Whether the rows above the axis are the mirrored side.
    upper: bool,
    height: u32,
}

impl Mirror {
    /// Mirror for an axis at buffer row `axis`, or `None` when the axis is
    /// not on a row or halfway between two rows, or when no row would be
    /// mirrored.
    pub fn new(axis: f64, height: u32) -> Option<Self> {
        let doubled = axis * 2.0;
        if !doubled.is_finite() || doubled.fract() != 0.0 {
            return None;
        }
        let axis2 = doubled as i64;
        let h = height as i64;
        // Rows strictly above and strictly below the axis, inside the buffer.
        let above = ((axis2 + 1) / 2).clamp(0, h);
        let below = (h - (axis2 / 2 + 1)).clamp(0, h);
        let mirror = Self {
            axis2,
            upper: above <= below,
            height,
        };
        (0..height).any(|y| mirror.source(y).is_some()).then_some(mirror)
    }

    /// Row whose content row `y` copies, if `y` is mirrored.
    pub fn source(&self, y: u32) -> Option<u32> {
        let y2 = 2 * y as i64;
        let mirrored_side = if self.upper {
            y2 < self.axis2
        } else {
            y2 > self.axis2
        };
        let source = self.axis2 - y as i64;
        (mirrored_side && (0..self.height as i64).contains(&source)).then_some(source as u32)
    }

    pub fn is_mirrored(&self, y: u32) -> bool {
        self.source(y).is_some()
    }
}
