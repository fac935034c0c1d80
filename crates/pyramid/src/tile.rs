//! Tile payloads passed between pyramid nodes.
//!
//! A node produces one of three kinds of tile:
//! - [`ArrayTile`]: numeric samples plus an optional mask
//! - [`RgbaTile`]: color-mapped pixels
//! - [`EncodedTile`]: compressed image bytes ready to be served

use crate::{PyramidError, Result};
use bytes::Bytes;
use renderer::ImageFormat;
use std::sync::Arc;
use storage::CacheValue;
use tile_common::Size2D;

/// Numeric tile of `f32` samples laid out as `[leading..., row, col]`.
///
/// `mask[i] == true` marks cell `i` as invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayTile {
    leading: Vec<usize>,
    width: usize,
    height: usize,
    data: Vec<f32>,
    mask: Option<Vec<bool>>,
}

impl ArrayTile {
    /// Create a tile with `leading` non-spatial dimensions.
    pub fn new(leading: Vec<usize>, width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        let expected = leading.iter().product::<usize>() * width * height;
        if data.len() != expected {
            return Err(PyramidError::shape(format!(
                "{} samples for shape {:?}x{}x{}, expected {}",
                data.len(),
                leading,
                height,
                width,
                expected
            )));
        }
        Ok(Self {
            leading,
            width,
            height,
            data,
            mask: None,
        })
    }

    /// Assemble a tile whose data length is known to match the shape.
    pub(crate) fn from_parts(
        leading: Vec<usize>,
        width: usize,
        height: usize,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(data.len(), leading.iter().product::<usize>() * width * height);
        Self {
            leading,
            width,
            height,
            data,
            mask: None,
        }
    }

    /// Create a 2-D tile.
    pub fn from_2d(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        Self::new(Vec::new(), width, height, data)
    }

    /// A tile with every sample set to `value`.
    pub fn filled(leading: Vec<usize>, width: usize, height: usize, value: f32) -> Self {
        let len = leading.iter().product::<usize>() * width * height;
        Self {
            leading,
            width,
            height,
            data: vec![value; len],
            mask: None,
        }
    }

    /// Attach a mask (one flag per sample).
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != self.data.len() {
            return Err(PyramidError::shape(format!(
                "mask has {} cells, tile has {}",
                mask.len(),
                self.data.len()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> Size2D {
        Size2D::new(self.width, self.height)
    }

    /// Sizes of the non-spatial dimensions.
    pub fn leading_shape(&self) -> &[usize] {
        &self.leading
    }

    /// Full shape, spatial dimensions last.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = self.leading.clone();
        shape.push(self.height);
        shape.push(self.width);
        shape
    }

    /// Number of 2-D planes stacked in this tile.
    pub fn num_planes(&self) -> usize {
        self.leading.iter().product()
    }

    fn plane_len(&self) -> usize {
        self.width * self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    /// Sample at `(row, col)` of the first plane.
    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask
            .as_ref()
            .map(|m| m[row * self.width + col])
            .unwrap_or(false)
    }

    /// Copy out plane `index` (row-major over the leading dimensions) as a 2-D tile.
    pub fn plane(&self, index: usize) -> Result<ArrayTile> {
        if index >= self.num_planes() {
            return Err(PyramidError::shape(format!(
                "plane {} of {} requested",
                index,
                self.num_planes()
            )));
        }
        let len = self.plane_len();
        let range = index * len..(index + 1) * len;
        Ok(ArrayTile {
            leading: Vec::new(),
            width: self.width,
            height: self.height,
            data: self.data[range.clone()].to_vec(),
            mask: self.mask.as_ref().map(|m| m[range].to_vec()),
        })
    }

    /// Reverse the row order of every plane.
    pub fn flip_rows(&self) -> ArrayTile {
        let plane_len = self.plane_len();
        ArrayTile {
            leading: self.leading.clone(),
            width: self.width,
            height: self.height,
            data: flip_planes(&self.data, plane_len, self.width),
            mask: self
                .mask
                .as_ref()
                .map(|m| flip_planes(m, plane_len, self.width)),
        }
    }

    /// Every `step`-th row and column of every plane, starting at the origin.
    pub fn subsample(&self, step: usize) -> ArrayTile {
        if step <= 1 {
            return self.clone();
        }
        let width = self.width.div_ceil(step);
        let height = self.height.div_ceil(step);
        let mut data = Vec::with_capacity(self.num_planes() * width * height);
        let mut mask = self.mask.as_ref().map(|_| Vec::with_capacity(data.capacity()));
        for plane in 0..self.num_planes() {
            let offset = plane * self.plane_len();
            for row in (0..self.height).step_by(step) {
                for col in (0..self.width).step_by(step) {
                    let i = offset + row * self.width + col;
                    data.push(self.data[i]);
                    if let (Some(out), Some(src)) = (mask.as_mut(), self.mask.as_ref()) {
                        out.push(src[i]);
                    }
                }
            }
        }
        ArrayTile {
            leading: self.leading.clone(),
            width,
            height,
            data,
            mask,
        }
    }

    /// Minimum and maximum over unmasked finite samples.
    pub fn nan_min_max(&self) -> Option<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if !v.is_finite() || self.mask.as_ref().map(|m| m[i]).unwrap_or(false) {
                continue;
            }
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        range
    }

    pub fn size_bytes(&self) -> u64 {
        let mask = self.mask.as_ref().map(|m| m.len()).unwrap_or(0);
        (self.data.len() * std::mem::size_of::<f32>() + mask) as u64
    }
}

fn flip_planes<T: Copy>(values: &[T], plane_len: usize, width: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for plane in values.chunks(plane_len.max(1)) {
        for row in plane.chunks(width.max(1)).rev() {
            out.extend_from_slice(row);
        }
    }
    out
}

/// Pad or crop `tile` to exactly `size`, keeping the top-left content.
///
/// Missing columns (right) and rows (bottom) are filled with `fill` and
/// left unmasked. Surplus rows and columns are dropped.
pub fn trim_tile(tile: &ArrayTile, size: Size2D, fill: f32) -> ArrayTile {
    if tile.size() == size {
        return tile.clone();
    }
    let planes = tile.num_planes();
    let mut data = Vec::with_capacity(planes * size.area());
    let mut mask = tile.mask.as_ref().map(|_| Vec::with_capacity(data.capacity()));
    let keep_cols = tile.width.min(size.width);
    let keep_rows = tile.height.min(size.height);

    for plane in 0..planes {
        let offset = plane * tile.plane_len();
        for row in 0..size.height {
            if row < keep_rows {
                let start = offset + row * tile.width;
                data.extend_from_slice(&tile.data[start..start + keep_cols]);
                data.extend(std::iter::repeat(fill).take(size.width - keep_cols));
                if let (Some(out), Some(src)) = (mask.as_mut(), tile.mask.as_ref()) {
                    out.extend_from_slice(&src[start..start + keep_cols]);
                    out.extend(std::iter::repeat(false).take(size.width - keep_cols));
                }
            } else {
                data.extend(std::iter::repeat(fill).take(size.width));
                if let Some(out) = mask.as_mut() {
                    out.extend(std::iter::repeat(false).take(size.width));
                }
            }
        }
    }

    ArrayTile {
        leading: tile.leading.clone(),
        width: size.width,
        height: size.height,
        data,
        mask,
    }
}

/// Color-mapped RGBA pixels, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaTile {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RgbaTile {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width * height * 4 {
            return Err(PyramidError::shape(format!(
                "{} bytes for {}x{} RGBA tile",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> Size2D {
        Size2D::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, row: usize, col: usize) -> [u8; 4] {
        let i = (row * self.width + col) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Encoded image bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTile {
    pub format: ImageFormat,
    pub data: Bytes,
}

/// A tile produced by a [`crate::TiledImage`].
///
/// Cloning is cheap: payloads are reference counted.
#[derive(Debug, Clone, PartialEq)]
pub enum Tile {
    Array(Arc<ArrayTile>),
    Rgba(Arc<RgbaTile>),
    Encoded(EncodedTile),
}

impl Tile {
    pub fn kind(&self) -> &'static str {
        match self {
            Tile::Array(_) => "array",
            Tile::Rgba(_) => "rgba",
            Tile::Encoded(_) => "encoded",
        }
    }

    pub fn as_array(&self) -> Result<&Arc<ArrayTile>> {
        match self {
            Tile::Array(tile) => Ok(tile),
            other => Err(PyramidError::TileKind {
                expected: "array",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_rgba(&self) -> Result<&Arc<RgbaTile>> {
        match self {
            Tile::Rgba(tile) => Ok(tile),
            other => Err(PyramidError::TileKind {
                expected: "rgba",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_encoded(&self) -> Result<&EncodedTile> {
        match self {
            Tile::Encoded(tile) => Ok(tile),
            other => Err(PyramidError::TileKind {
                expected: "encoded",
                actual: other.kind(),
            }),
        }
    }

    /// The encoded bytes of an encoded tile.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Tile::Encoded(tile) => Ok(tile.data),
            other => Err(PyramidError::TileKind {
                expected: "encoded",
                actual: other.kind(),
            }),
        }
    }
}

impl From<ArrayTile> for Tile {
    fn from(tile: ArrayTile) -> Self {
        Tile::Array(Arc::new(tile))
    }
}

impl From<RgbaTile> for Tile {
    fn from(tile: RgbaTile) -> Self {
        Tile::Rgba(Arc::new(tile))
    }
}

impl From<EncodedTile> for Tile {
    fn from(tile: EncodedTile) -> Self {
        Tile::Encoded(tile)
    }
}

/// Only encoded tiles can go to byte-oriented stores; the image format is
/// recovered from the magic number.
impl CacheValue for Tile {
    fn size_bytes(&self) -> u64 {
        match self {
            Tile::Array(tile) => tile.size_bytes(),
            Tile::Rgba(tile) => tile.pixels.len() as u64,
            Tile::Encoded(tile) => tile.data.len() as u64,
        }
    }

    fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Tile::Encoded(tile) => Some(tile.data.clone()),
            _ => None,
        }
    }

    fn from_bytes(bytes: Bytes) -> Option<Self> {
        let format = ImageFormat::sniff(&bytes)?;
        Some(Tile::Encoded(EncodedTile {
            format,
            data: bytes,
        }))
    }
}
