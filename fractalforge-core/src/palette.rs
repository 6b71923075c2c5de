//! Piecewise gradient palettes.
//!
//! A palette is a sequence of elements, each interpolating between two colors
//! over a number of steps. Lookups address the palette by step index; the
//! index wraps around the total step count.

use crate::Color;
use serde::{Deserialize, Serialize};

/// Shape of the interpolation inside one element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaletteMapping {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    Smooth,
}

impl PaletteMapping {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            PaletteMapping::Linear => t,
            PaletteMapping::EaseIn => t * t,
            PaletteMapping::EaseOut => libm::sqrt(t),
            PaletteMapping::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaletteElement {
    pub begin: Color,
    pub end: Color,
    pub steps: u32,
    pub mapping: PaletteMapping,
}

impl PaletteElement {
    pub fn new(begin: Color, end: Color, steps: u32, mapping: PaletteMapping) -> Self {
        Self {
            begin,
            end,
            steps,
            mapping,
        }
    }

    fn color_at(&self, offset: f64) -> Color {
        let t = if self.steps > 1 {
            (offset / (self.steps - 1) as f64).min(1.0)
        } else {
            0.0
        };
        self.begin.lerp(&self.end, self.mapping.apply(t) as f32)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    elements: Vec<PaletteElement>,
    /// First step of each element.
    offsets: Vec<u32>,
    len: u32,
}

impl Palette {
    /// Build a palette. Elements with zero steps contribute nothing.
    pub fn build(elements: Vec<PaletteElement>) -> Self {
        let mut offsets = Vec::with_capacity(elements.len());
        let mut len = 0u32;
        for element in &elements {
            offsets.push(len);
            len = len.saturating_add(element.steps);
        }
        Self {
            elements,
            offsets,
            len,
        }
    }

    /// Total number of steps.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elements(&self) -> &[PaletteElement] {
        &self.elements
    }

    /// Color at a (fractional) step index, wrapping modulo `len()`.
    /// Non-finite indices and empty palettes yield transparent.
    pub fn color_at_step(&self, index: f64) -> Color {
        if self.len == 0 || !index.is_finite() {
            return Color::TRANSPARENT;
        }
        let index = index.rem_euclid(self.len as f64);
        // Last element starting at or before `index`; never a zero-step one.
        let slot = self
            .offsets
            .partition_point(|offset| (*offset as f64) <= index)
            .saturating_sub(1);
        let element = &self.elements[slot];
        element.color_at(index - self.offsets[slot] as f64)
    }

    /// Normalized lookup: `position` in `[0, 1]` spans the whole palette.
    pub fn color_at(&self, position: f64) -> Color {
        if self.len == 0 || !position.is_finite() {
            return Color::TRANSPARENT;
        }
        let position = position.clamp(0.0, 1.0);
        self.color_at_step(position * (self.len - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grayscale(steps: u32) -> Palette {
        Palette::build(vec![PaletteElement::new(
            Color::BLACK,
            Color::WHITE,
            steps,
            PaletteMapping::Linear,
        )])
    }

    #[test]
    fn midpoint_of_black_to_white_is_mid_gray() {
        let palette = grayscale(256);
        let argb = palette.color_at(0.5).to_argb();
        let red = ((argb >> 16) & 0xff) as i32;
        assert!((red - 128).abs() <= 1, "got red channel {}", red);
        assert_eq!(argb >> 24, 0xff);
    }

    #[test]
    fn endpoints_hit_element_colors() {
        let palette = grayscale(16);
        assert_eq!(palette.color_at(0.0), Color::BLACK);
        assert_eq!(palette.color_at(1.0), Color::WHITE);
        assert_eq!(palette.color_at_step(15.0), Color::WHITE);
    }

    #[test]
    fn step_index_wraps_around() {
        let palette = grayscale(10);
        assert_eq!(palette.color_at_step(12.0), palette.color_at_step(2.0));
        assert_eq!(palette.color_at_step(-1.0), palette.color_at_step(9.0));
    }

    #[test]
    fn lookup_selects_the_containing_element() {
        let red = Color::rgb(1.0, 0.0, 0.0);
        let blue = Color::rgb(0.0, 0.0, 1.0);
        let palette = Palette::build(vec![
            PaletteElement::new(red, red, 4, PaletteMapping::Linear),
            PaletteElement::new(blue, blue, 4, PaletteMapping::Smooth),
        ]);
        assert_eq!(palette.len(), 8);
        assert_eq!(palette.color_at_step(3.0), red);
        assert_eq!(palette.color_at_step(4.0), blue);
    }

    #[test]
    fn mappings_fix_endpoints() {
        for mapping in [
            PaletteMapping::Linear,
            PaletteMapping::EaseIn,
            PaletteMapping::EaseOut,
            PaletteMapping::Smooth,
        ] {
            assert_eq!(mapping.apply(0.0), 0.0);
            assert_eq!(mapping.apply(1.0), 1.0);
        }
        assert!(PaletteMapping::EaseIn.apply(0.5) < 0.5);
        assert!(PaletteMapping::EaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn empty_palette_is_transparent() {
        let palette = Palette::build(Vec::new());
        assert!(palette.is_empty());
        assert_eq!(palette.color_at(0.3), Color::TRANSPARENT);
    }
}
