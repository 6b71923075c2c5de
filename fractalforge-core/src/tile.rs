//! Tiles of a virtual output image.
//!
//! A tile is the part of a (possibly much larger) image one renderer
//! produces. The render buffer covers the tile plus a border on every side;
//! border pixels are computed but not part of the exposed tile.

use crate::PixelRect;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Size of the whole virtual image.
    pub image_size: Dimensions,
    pub tile_size: Dimensions,
    /// Position of the tile's top-left pixel in the virtual image.
    pub tile_offset: (u32, u32),
    pub border_size: u32,
}

impl Tile {
    pub fn new(
        image_size: Dimensions,
        tile_size: Dimensions,
        tile_offset: (u32, u32),
        border_size: u32,
    ) -> Self {
        Self {
            image_size,
            tile_size,
            tile_offset,
            border_size,
        }
    }

    /// A tile covering an entire `width × height` image without border.
    pub fn whole(width: u32, height: u32) -> Self {
        let size = Dimensions::new(width, height);
        Self::new(size, size, (0, 0), 0)
    }

    pub fn buffer_width(&self) -> u32 {
        self.tile_size.width + 2 * self.border_size
    }

    pub fn buffer_height(&self) -> u32 {
        self.tile_size.height + 2 * self.border_size
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_width() as usize * self.buffer_height() as usize
    }

    /// Whole buffer, border included.
    pub fn buffer_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.buffer_width(), self.buffer_height())
    }

    /// The exposed tile inside the buffer.
    pub fn exposed_rect(&self) -> PixelRect {
        PixelRect::new(
            self.border_size,
            self.border_size,
            self.tile_size.width,
            self.tile_size.height,
        )
    }

    /// Position in the virtual image of buffer pixel `(bx, by)`. Border
    /// pixels may fall outside the image, hence signed.
    pub fn virtual_pixel(&self, bx: u32, by: u32) -> (f64, f64) {
        (
            self.tile_offset.0 as f64 + bx as f64 - self.border_size as f64,
            self.tile_offset.1 as f64 + by as f64 - self.border_size as f64,
        )
    }
}
