//! Tile addressing and pixel geometry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tile coordinate (z/x/y), level 0 being the lowest resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Pyramid level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y), counted from the top
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Relative path used when writing tiles to disk, e.g. `3/4/2.png`.
    pub fn path(&self, ext: &str) -> String {
        format!("{}/{}/{}.{}", self.z, self.x, self.y, ext)
    }

    /// Get the parent tile (level - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four children (level + 1), in the order their quadrants are
    /// composited: top-left, bottom-left, top-right, bottom-right.
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord { z, x: x + 1, y },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Width and height in pixels (or tiles).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size2D {
    pub width: usize,
    pub height: usize,
}

impl Size2D {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Half of this size, rounding down.
    pub fn halved(&self) -> Self {
        Self::new(self.width / 2, self.height / 2)
    }

    /// Number of tiles of `tile` size needed to cover this size.
    pub fn tiles_for(&self, tile: Size2D) -> Size2D {
        Size2D::new(
            self.width.div_ceil(tile.width.max(1)),
            self.height.div_ceil(tile.height.max(1)),
        )
    }
}

impl fmt::Display for Size2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel rectangle `(x, y, width, height)` within an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle covered by tile `(tile_x, tile_y)`.
    pub fn for_tile(tile_x: usize, tile_y: usize, tile_size: Size2D) -> Self {
        Self::new(
            tile_x * tile_size.width,
            tile_y * tile_size.height,
            tile_size.width,
            tile_size.height,
        )
    }

    /// Intersection with an image of `size`, anchored at this rectangle's
    /// origin. The result is empty when the origin lies outside the image.
    pub fn clip_to(&self, size: Size2D) -> Self {
        let width = size.width.saturating_sub(self.x).min(self.width);
        let height = size.height.saturating_sub(self.y).min(self.height);
        Self::new(self.x, self.y, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
