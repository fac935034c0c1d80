//! Downsampling nodes that produce one pyramid level.
//!
//! - [`StridedRead`]: reads every `2^step_exp`-th sample straight from the
//!   raster array, so levels do not depend on each other.
//! - [`QuadResize`]: resizes the four child tiles of the next finer level
//!   with an image filter and composites them (RGBA tiles).
//! - [`QuadAggregate`]: reduces 2x2 blocks of the four child tiles with a
//!   [`BlockAggregator`] (numeric tiles).
//!
//! Child quadrants are placed top-left `(2x, 2y)`, bottom-left
//! `(2x, 2y+1)`, top-right `(2x+1, 2y)` and bottom-right `(2x+1, 2y+1)`.
//! Children missing at the source's right or bottom edge leave their
//! quadrant empty (transparent or NaN).

use crate::node::{ImageLayout, ImageRef, OpImage, TileOp};
use crate::tile::trim_tile;
use crate::{ArrayRef, ArrayTile, PyramidError, Result, RgbaTile, Tile};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tile_common::{PixelRect, Size2D, TileGrid};

/// Method used to reduce a 2x2 block of samples to one.
///
/// NaN samples are ignored by `Mean` and `Max`; a block of only NaN
/// reduces to NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMethod {
    /// Average of the block - continuous fields
    #[default]
    Mean,
    /// Maximum of the block - preserves peaks
    Max,
    /// Top-left sample - preserves exact values
    Nearest,
}

impl std::str::FromStr for DownsampleMethod {
    type Err = PyramidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(DownsampleMethod::Mean),
            "max" => Ok(DownsampleMethod::Max),
            "nearest" | "first" => Ok(DownsampleMethod::Nearest),
            _ => Err(PyramidError::Config(format!("unknown downsample method '{}'", s))),
        }
    }
}

/// Reduces a 2x2 block given as `[top-left, top-right, bottom-left, bottom-right]`.
pub trait BlockAggregator: Send + Sync {
    fn aggregate(&self, block: [f32; 4]) -> f32;
}

impl BlockAggregator for DownsampleMethod {
    #[inline]
    fn aggregate(&self, block: [f32; 4]) -> f32 {
        match self {
            DownsampleMethod::Mean => mean_of_block(block),
            DownsampleMethod::Max => max_of_block(block),
            DownsampleMethod::Nearest => block[0],
        }
    }
}

impl<F> BlockAggregator for F
where
    F: Fn([f32; 4]) -> f32 + Send + Sync,
{
    fn aggregate(&self, block: [f32; 4]) -> f32 {
        self(block)
    }
}

#[inline]
fn mean_of_block(block: [f32; 4]) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0;
    for v in block {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f32::NAN
    } else {
        sum / count as f32
    }
}

#[inline]
fn max_of_block(block: [f32; 4]) -> f32 {
    block
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |max: Option<f32>, v| Some(max.map_or(v, |m| m.max(v))))
        .unwrap_or(f32::NAN)
}

/// Halve every plane of `tile`, rounding odd sizes down.
///
/// Masked samples enter the reduction as NaN; the result carries no mask.
pub fn downsample_2x(tile: &ArrayTile, aggregator: &dyn BlockAggregator) -> ArrayTile {
    let (width, height) = (tile.width(), tile.height());
    let (new_width, new_height) = (width / 2, height / 2);
    let plane_len = width * height;
    let data = tile.data();
    let mask = tile.mask();
    let sample = |i: usize| -> f32 {
        if mask.is_some_and(|m| m[i]) {
            f32::NAN
        } else {
            data[i]
        }
    };

    let mut output = Vec::with_capacity(tile.num_planes() * new_width * new_height);
    for plane in 0..tile.num_planes() {
        let offset = plane * plane_len;
        for out_y in 0..new_height {
            for out_x in 0..new_width {
                let top = offset + out_y * 2 * width + out_x * 2;
                let bottom = top + width;
                output.push(aggregator.aggregate([
                    sample(top),
                    sample(top + 1),
                    sample(bottom),
                    sample(bottom + 1),
                ]));
            }
        }
    }

    ArrayTile::from_parts(tile.leading_shape().to_vec(), new_width, new_height, output)
}

type Quadrant = ((usize, usize), (usize, usize));

/// Source tile indices and target offsets of the four child quadrants.
fn quadrants(tile_x: usize, tile_y: usize, tile_size: Size2D) -> [Quadrant; 4] {
    let (x, y) = (2 * tile_x, 2 * tile_y);
    let half = tile_size.halved();
    [
        ((x, y), (0, 0)),
        ((x, y + 1), (0, half.height)),
        ((x + 1, y), (half.width, 0)),
        ((x + 1, y + 1), (half.width, half.height)),
    ]
}

/// Layout of the level built from `source` by halving, rounding up so
/// that every source tile has a parent.
fn halved_layout(source: &ImageRef) -> ImageLayout {
    let size = source.size();
    let num_tiles = source.num_tiles();
    ImageLayout {
        size: Size2D::new(size.width.div_ceil(2), size.height.div_ceil(2)),
        tile_size: source.tile_size(),
        num_tiles: Size2D::new(num_tiles.width.div_ceil(2), num_tiles.height.div_ceil(2)),
    }
}

fn has_tile(source: &ImageRef, tile_x: usize, tile_y: usize) -> bool {
    let num_tiles = source.num_tiles();
    tile_x < num_tiles.width && tile_y < num_tiles.height
}

/// Direct strided read from the raster array.
pub struct StridedRead {
    array: ArrayRef,
    step: usize,
    tile_size: Size2D,
}

/// A level read directly from the raster array at a fixed stride.
pub type StridedImage = OpImage<StridedRead>;

impl StridedRead {
    /// Image of `array` subsampled by `2^step_exp`, tiled with `tile_size`.
    pub fn image(
        id: impl Into<String>,
        array: ArrayRef,
        tile_size: Size2D,
        step_exp: usize,
    ) -> StridedImage {
        let step = 1 << step_exp;
        let size = Size2D::new(array.width() / step, array.height() / step);
        let layout = ImageLayout::covering(size, tile_size);
        OpImage::new(id, layout, StridedRead { array, step, tile_size })
    }

    /// Image of `array` at `level` of `grid`, padded to the grid's level size.
    pub fn level_image(
        id: impl Into<String>,
        array: ArrayRef,
        grid: &TileGrid,
        level: usize,
    ) -> StridedImage {
        let tile_size = grid.tile_size();
        let layout = ImageLayout {
            size: grid.size(level),
            tile_size,
            num_tiles: grid.num_tiles(level),
        };
        let step = grid.level_step(level);
        OpImage::new(id, layout, StridedRead { array, step, tile_size })
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

impl TileOp for StridedRead {
    fn compute_tile(&self, _tile_x: usize, _tile_y: usize, rect: PixelRect) -> Result<Tile> {
        let s = self.step;
        let window = PixelRect::new(rect.x * s, rect.y * s, rect.width * s, rect.height * s);
        // Read unstrided first; strided access is slow on chunked backends.
        let tile = self.array.read_window(window)?.subsample(s);
        Ok(trim_tile(&tile, self.tile_size, f32::NAN).into())
    }
}

/// Composites resized RGBA child tiles.
pub struct QuadResize {
    source: ImageRef,
    filter: FilterType,
    tile_size: Size2D,
}

/// A level built by resizing child tiles.
pub type ResizedImage = OpImage<QuadResize>;

impl QuadResize {
    pub fn image(id: impl Into<String>, source: ImageRef, filter: FilterType) -> ResizedImage {
        let layout = halved_layout(&source);
        let tile_size = layout.tile_size;
        OpImage::new(
            id,
            layout,
            QuadResize {
                source,
                filter,
                tile_size,
            },
        )
    }
}

impl TileOp for QuadResize {
    fn compute_tile(&self, tile_x: usize, tile_y: usize, _rect: PixelRect) -> Result<Tile> {
        let half = self.tile_size.halved();
        let mut target = RgbaImage::new(self.tile_size.width as u32, self.tile_size.height as u32);

        for ((child_x, child_y), (x, y)) in quadrants(tile_x, tile_y, self.tile_size) {
            if !has_tile(&self.source, child_x, child_y) {
                continue;
            }
            let child = self.source.get_tile(child_x, child_y)?;
            let child = child.as_rgba()?;
            let image = RgbaImage::from_raw(
                child.width() as u32,
                child.height() as u32,
                child.pixels().to_vec(),
            )
            .ok_or_else(|| PyramidError::shape("child tile buffer does not match its size"))?;
            let resized =
                imageops::resize(&image, half.width as u32, half.height as u32, self.filter);
            imageops::replace(&mut target, &resized, x as i64, y as i64);
        }

        let tile = RgbaTile::new(
            self.tile_size.width,
            self.tile_size.height,
            target.into_raw(),
        )?;
        Ok(tile.into())
    }
}

/// Aggregates 2x2 blocks of numeric child tiles.
pub struct QuadAggregate<A> {
    source: ImageRef,
    aggregator: A,
    tile_size: Size2D,
}

/// A level built by aggregating child tiles.
pub type AggregatedImage<A> = OpImage<QuadAggregate<A>>;

impl<A: BlockAggregator> QuadAggregate<A> {
    pub fn image(id: impl Into<String>, source: ImageRef, aggregator: A) -> AggregatedImage<A> {
        let layout = halved_layout(&source);
        let tile_size = layout.tile_size;
        OpImage::new(
            id,
            layout,
            QuadAggregate {
                source,
                aggregator,
                tile_size,
            },
        )
    }
}

impl<A: BlockAggregator> TileOp for QuadAggregate<A> {
    fn compute_tile(&self, tile_x: usize, tile_y: usize, _rect: PixelRect) -> Result<Tile> {
        let size = self.tile_size;
        let mut target: Option<(Vec<usize>, Vec<f32>)> = None;

        for ((child_x, child_y), (x0, y0)) in quadrants(tile_x, tile_y, size) {
            if !has_tile(&self.source, child_x, child_y) {
                continue;
            }
            let child = self.source.get_tile(child_x, child_y)?;
            let reduced = downsample_2x(child.as_array()?, &self.aggregator);

            let (leading, data) = target.get_or_insert_with(|| {
                let leading = reduced.leading_shape().to_vec();
                let planes: usize = leading.iter().product();
                (leading, vec![f32::NAN; planes * size.area()])
            });
            if reduced.leading_shape() != leading.as_slice() {
                return Err(PyramidError::shape(format!(
                    "child tile leading shape {:?} differs from {:?}",
                    reduced.leading_shape(),
                    leading
                )));
            }
            paste(data, size, &reduced, x0, y0);
        }

        let (leading, data) = target.unwrap_or_else(|| (Vec::new(), vec![f32::NAN; size.area()]));
        Ok(ArrayTile::new(leading, size.width, size.height, data)?.into())
    }
}

/// Copy every plane of `tile` into `target` at `(x0, y0)`, clipped to `size`.
fn paste(target: &mut [f32], size: Size2D, tile: &ArrayTile, x0: usize, y0: usize) {
    let cols = tile.width().min(size.width.saturating_sub(x0));
    let rows = tile.height().min(size.height.saturating_sub(y0));
    let source_plane = tile.width() * tile.height();
    for plane in 0..tile.num_planes() {
        for row in 0..rows {
            let src = plane * source_plane + row * tile.width();
            let dst = plane * size.area() + (y0 + row) * size.width + x0;
            target[dst..dst + cols].copy_from_slice(&tile.data()[src..src + cols]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryArray, TiledImage};
    use std::sync::Arc;
    use test_utils::create_test_grid;

    fn tile_1_to_16() -> ArrayTile {
        let data: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        ArrayTile::from_2d(4, 4, data).unwrap()
    }

    #[test]
    fn test_downsample_2x_mean() {
        let result = downsample_2x(&tile_1_to_16(), &DownsampleMethod::Mean);
        assert_eq!(result.size(), Size2D::new(2, 2));
        // Top-left 2x2 block: 1,2,5,6 -> mean = 3.5
        assert!((result.value(0, 0) - 3.5).abs() < 0.001);
        // Top-right 2x2 block: 3,4,7,8 -> mean = 5.5
        assert!((result.value(0, 1) - 5.5).abs() < 0.001);
    }

    #[test]
    fn test_downsample_2x_max() {
        let result = downsample_2x(&tile_1_to_16(), &DownsampleMethod::Max);
        assert!((result.value(0, 0) - 6.0).abs() < 0.001);
        assert!((result.value(0, 1) - 8.0).abs() < 0.001);
    }

    #[test]
    fn test_downsample_2x_nearest() {
        let result = downsample_2x(&tile_1_to_16(), &DownsampleMethod::Nearest);
        assert_eq!(result.value(0, 0), 1.0);
        assert_eq!(result.value(0, 1), 3.0);
        assert_eq!(result.value(1, 0), 9.0);
    }

    #[test]
    fn test_downsample_handles_nan_and_mask() {
        let tile = ArrayTile::from_2d(2, 2, vec![1.0, f32::NAN, 3.0, 4.0])
            .unwrap()
            .with_mask(vec![false, false, false, true])
            .unwrap();
        let result = downsample_2x(&tile, &DownsampleMethod::Mean);
        // Mean of 1 and 3; NaN and the masked 4 are ignored
        assert!((result.value(0, 0) - 2.0).abs() < 0.001);
        assert!(result.mask().is_none());

        let all_nan = ArrayTile::filled(vec![], 2, 2, f32::NAN);
        assert!(downsample_2x(&all_nan, &DownsampleMethod::Max).value(0, 0).is_nan());
    }

    #[test]
    fn test_custom_aggregator() {
        let sum = |block: [f32; 4]| block.iter().sum::<f32>();
        let result = downsample_2x(&tile_1_to_16(), &sum);
        assert_eq!(result.value(0, 0), 14.0);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("MAX".parse::<DownsampleMethod>().unwrap(), DownsampleMethod::Max);
        assert_eq!("first".parse::<DownsampleMethod>().unwrap(), DownsampleMethod::Nearest);
        assert!("median".parse::<DownsampleMethod>().is_err());
        let method: DownsampleMethod = serde_json::from_str("\"mean\"").unwrap();
        assert_eq!(method, DownsampleMethod::Mean);
    }

    #[test]
    fn test_strided_read_matches_subsampled_array() {
        let (width, height) = (10, 6);
        let array: ArrayRef =
            Arc::new(InMemoryArray::from_2d(width, height, create_test_grid(width, height)).unwrap());
        let image = StridedRead::image("arr", array, Size2D::new(4, 4), 1);
        assert_eq!(image.size(), Size2D::new(5, 3));
        assert_eq!(image.num_tiles(), Size2D::new(2, 1));

        let tile = image.get_tile(1, 0).unwrap();
        let tile = tile.as_array().unwrap();
        assert_eq!(tile.size(), Size2D::new(4, 4));
        // level column 4 is array column 8
        assert_eq!(tile.value(0, 0), 8000.0);
        assert_eq!(tile.value(2, 0), 8004.0);
        // beyond the array: NaN padding
        assert!(tile.value(0, 1).is_nan());
        assert!(tile.value(3, 0).is_nan());
    }
}
