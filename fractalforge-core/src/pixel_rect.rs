use serde::{Deserialize, Serialize};

/// Rectangle in buffer pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// One past the last row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// One past the last column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Cut into full-width horizontal bands of `band_height` rows; the last
    /// band takes the remainder.
    pub fn split_rows(&self, band_height: u32) -> Vec<PixelRect> {
        let band_height = band_height.max(1);
        (self.y..self.bottom())
            .step_by(band_height as usize)
            .map(|y| {
                let height = band_height.min(self.bottom() - y);
                PixelRect::new(self.x, y, self.width, height)
            })
            .collect()
    }
}
