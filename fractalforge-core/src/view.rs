//! Mapping between image pixels and the complex plane.
//!
//! The orbit program declares a [`Region`]; the caller moves around it with a
//! [`View`] (translation, zoom, rotation). Pixels are square: the pixel size
//! is the larger of the two axis ratios so the whole region stays visible.

use crate::ast::AstRegion;
use crate::{ComplexNumber, Tile};
use serde::{Deserialize, Serialize};

/// Region of the complex plane shown at zoom 1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: ComplexNumber,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(center: ComplexNumber, width: f64, height: f64) -> Self {
        Self {
            center,
            width,
            height,
        }
    }
}

impl From<&AstRegion> for Region {
    fn from(region: &AstRegion) -> Self {
        Self::new(region.center(), region.width(), region.height())
    }
}

/// Caller-controlled transform applied on top of the region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub translation: ComplexNumber,
    pub zoom: f64,
    /// Rotation in radians around the view center.
    pub rotation: f64,
}

impl Default for View {
    fn default() -> Self {
        Self {
            translation: ComplexNumber::ZERO,
            zoom: 1.0,
            rotation: 0.0,
        }
    }
}

impl View {
    pub fn new(translation: ComplexNumber, zoom: f64, rotation: f64) -> Self {
        Self {
            translation,
            zoom,
            rotation,
        }
    }
}

/// Precomputed pixel → complex mapping for one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelMapper {
    center: ComplexNumber,
    pixel_size: f64,
    half_width: f64,
    half_height: f64,
    cos: f64,
    sin: f64,
    rotated: bool,
    tile: Tile,
}

impl PixelMapper {
    pub fn new(region: &Region, view: &View, tile: &Tile) -> Self {
        let image = tile.image_size;
        let zoom = if view.zoom > 0.0 { view.zoom } else { 1.0 };
        let pixel_size = (region.width / image.width.max(1) as f64)
            .max(region.height / image.height.max(1) as f64)
            / zoom;
        Self {
            center: region.center + view.translation,
            pixel_size,
            half_width: image.width as f64 / 2.0,
            half_height: image.height as f64 / 2.0,
            cos: libm::cos(view.rotation),
            sin: libm::sin(view.rotation),
            rotated: view.rotation != 0.0,
            tile: *tile,
        }
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn center(&self) -> ComplexNumber {
        self.center
    }

    pub fn is_rotated(&self) -> bool {
        self.rotated
    }

    /// Complex point of buffer pixel `(bx, by)`. Image rows grow downwards,
    /// the imaginary axis grows upwards.
    pub fn map(&self, bx: u32, by: u32) -> ComplexNumber {
        let (vx, vy) = self.tile.virtual_pixel(bx, by);
        let dx = (vx - self.half_width) * self.pixel_size;
        let dy = (self.half_height - vy) * self.pixel_size;
        if self.rotated {
            self.center
                + ComplexNumber::new(dx * self.cos - dy * self.sin, dx * self.sin + dy * self.cos)
        } else {
            self.center + ComplexNumber::new(dx, dy)
        }
    }

    /// Buffer row (possibly fractional, possibly outside the buffer) on which
    /// the real axis lies. `None` when the view is rotated.
    pub fn real_axis_row(&self) -> Option<f64> {
        if self.rotated || self.pixel_size == 0.0 {
            return None;
        }
        let vy = self.half_height + self.center.im / self.pixel_size;
        Some(vy - self.tile.tile_offset.1 as f64 + self.tile.border_size as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_region() -> Region {
        Region::from(&AstRegion::default())
    }

    #[test]
    fn image_center_maps_to_region_center() {
        let tile = Tile::whole(16, 16);
        let mapper = PixelMapper::new(&square_region(), &View::default(), &tile);
        assert_eq!(mapper.pixel_size(), 0.25);
        assert_eq!(mapper.map(8, 8), ComplexNumber::ZERO);
        assert_eq!(mapper.map(0, 0), ComplexNumber::new(-2.0, 2.0));
    }

    #[test]
    fn pixels_stay_square_for_wide_images() {
        let tile = Tile::whole(32, 16);
        let mapper = PixelMapper::new(&square_region(), &View::default(), &tile);
        assert_eq!(mapper.pixel_size(), 0.25);
        assert_eq!(mapper.map(0, 8), ComplexNumber::new(-4.0, 0.0));
    }

    #[test]
    fn zoom_and_translation_move_the_view() {
        let tile = Tile::whole(16, 16);
        let view = View::new(ComplexNumber::new(1.0, 0.0), 2.0, 0.0);
        let mapper = PixelMapper::new(&square_region(), &view, &tile);
        assert_eq!(mapper.pixel_size(), 0.125);
        assert_eq!(mapper.map(8, 8), ComplexNumber::new(1.0, 0.0));
        assert_eq!(mapper.map(16, 8), ComplexNumber::new(2.0, 0.0));
    }

    #[test]
    fn quarter_turn_rotates_offsets() {
        let tile = Tile::whole(16, 16);
        let view = View::new(ComplexNumber::ZERO, 1.0, std::f64::consts::FRAC_PI_2);
        let mapper = PixelMapper::new(&square_region(), &view, &tile);
        let p = mapper.map(16, 8);
        assert!(p.re.abs() < 1e-12);
        assert!((p.im - 2.0).abs() < 1e-12);
        assert_eq!(mapper.real_axis_row(), None);
    }

    #[test]
    fn real_axis_row_accounts_for_tile_offset() {
        let tile = Tile::whole(16, 16);
        let mapper = PixelMapper::new(&square_region(), &View::default(), &tile);
        assert_eq!(mapper.real_axis_row(), Some(8.0));

        let shifted = Tile::new(tile.image_size, crate::Dimensions::new(16, 8), (0, 8), 0);
        let mapper = PixelMapper::new(&square_region(), &View::default(), &shifted);
        assert_eq!(mapper.real_axis_row(), Some(0.0));
    }
}
