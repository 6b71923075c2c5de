//! Floating point ARGB color and the alpha-over blend used by color rules.

use serde::{Deserialize, Serialize};

/// Color channels in `[0, 1]`, alpha first: `[a, r, g, b]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color(pub [f32; 4]);

impl Color {
    pub const TRANSPARENT: Color = Color([0.0, 0.0, 0.0, 0.0]);
    pub const BLACK: Color = Color([1.0, 0.0, 0.0, 0.0]);
    pub const WHITE: Color = Color([1.0, 1.0, 1.0, 1.0]);

    pub const fn new(alpha: f32, red: f32, green: f32, blue: f32) -> Self {
        Color([alpha, red, green, blue])
    }

    pub const fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Color([1.0, red, green, blue])
    }

    pub fn from_argb(argb: u32) -> Self {
        let channel = |shift: u32| ((argb >> shift) & 0xff) as f32 / 255.0;
        Color([channel(24), channel(16), channel(8), channel(0)])
    }

    /// Pack into ARGB32, clamping each channel.
    pub fn to_argb(&self) -> u32 {
        self.0.iter().fold(0u32, |packed, c| {
            let byte = (c.clamp(0.0, 1.0) * 255.0).round() as u32;
            (packed << 8) | byte
        })
    }

    #[inline]
    pub fn alpha(&self) -> f32 {
        self.0[0]
    }

    /// Straight alpha-over: `a = opacity * color.alpha`, then every channel
    /// becomes `(1 - a) * old + a * new`.
    pub fn blend(&mut self, color: &Color, opacity: f32) {
        let a = opacity * color.alpha();
        for (old, new) in self.0.iter_mut().zip(color.0.iter()) {
            *old = (1.0 - a) * *old + a * *new;
        }
    }

    /// Linear interpolation towards `other`.
    pub fn lerp(&self, other: &Color, t: f32) -> Color {
        let mut out = [0.0f32; 4];
        for (i, c) in out.iter_mut().enumerate() {
            *c = self.0[i] + (other.0[i] - self.0[i]) * t;
        }
        Color(out)
    }
}

impl From<u32> for Color {
    fn from(argb: u32) -> Self {
        Color::from_argb(argb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_packing_roundtrips_bytes() {
        let packed = 0x80ff4000;
        assert_eq!(Color::from_argb(packed).to_argb(), packed);
        assert_eq!(Color::BLACK.to_argb(), 0xff000000);
    }

    #[test]
    fn half_opacity_blend_mixes_evenly() {
        let mut color = Color::rgb(1.0, 0.0, 0.0);
        color.blend(&Color::rgb(0.0, 0.0, 1.0), 0.5);
        let [a, r, g, b] = color.0;
        assert!((a - 1.0).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
        assert!(g.abs() < 1e-6);
        assert!((b - 0.5).abs() < 1e-6);
    }

    #[test]
    fn transparent_color_leaves_base_untouched() {
        let mut color = Color::rgb(0.2, 0.4, 0.6);
        color.blend(&Color::TRANSPARENT, 1.0);
        assert_eq!(color, Color::rgb(0.2, 0.4, 0.6));
    }

    #[test]
    fn out_of_range_channels_clamp_when_packed() {
        assert_eq!(Color::new(2.0, -1.0, 0.5, 1.0).to_argb(), 0xff0080ff);
    }
}
