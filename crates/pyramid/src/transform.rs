//! Per-tile transforms layered over pyramid levels.

use crate::array::plane_index;
use crate::{ArrayTile, EncodedTile, Result, RgbaTile, Tile, TileTransform};
use renderer::{colorize, encode_rgba, ColorRamp, ImageFormat, ValueRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tile_common::{PixelRect, Size2D};

/// Inclusive range of valid sample values; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValidRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    fn excludes(&self, value: f64) -> bool {
        self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max)
    }
}

/// Orientation and masking of numeric tiles.
///
/// Masks are derived only for tiles that do not carry one yet, from the
/// first applicable rule: cells equal to `no_data`, else cells outside
/// `valid_range`, else non-finite cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayTransform {
    flip_y: bool,
    leading_indices: Option<Vec<usize>>,
    no_data: Option<f64>,
    valid_range: Option<ValidRange>,
}

impl ArrayTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reverse row order, and request the mirrored tile row from the source.
    pub fn with_flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = flip_y;
        self
    }

    /// Select one 2-D plane of N-D tiles.
    pub fn with_leading_indices(mut self, indices: Vec<usize>) -> Self {
        self.leading_indices = Some(indices);
        self
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_valid_range(mut self, valid_range: Option<ValidRange>) -> Self {
        self.valid_range = valid_range;
        self
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    fn derive_mask(&self, values: &[f32]) -> Vec<bool> {
        if let Some(no_data) = self.no_data {
            values.iter().map(|&v| v as f64 == no_data).collect()
        } else if let Some(range) = self.valid_range {
            values.iter().map(|&v| range.excludes(v as f64)).collect()
        } else {
            values.iter().map(|v| !v.is_finite()).collect()
        }
    }
}

impl TileTransform for ArrayTransform {
    fn source_tile(&self, tile_x: usize, tile_y: usize, num_tiles: Size2D) -> (usize, usize) {
        if self.flip_y {
            (tile_x, num_tiles.height - 1 - tile_y)
        } else {
            (tile_x, tile_y)
        }
    }

    fn transform_tile(
        &self,
        _tile_x: usize,
        _tile_y: usize,
        _rect: PixelRect,
        source: Tile,
    ) -> Result<Tile> {
        let source = source.as_array()?;

        let mut tile = match &self.leading_indices {
            Some(indices) => source.plane(plane_index(source.leading_shape(), indices)?)?,
            None => source.as_ref().clone(),
        };
        if self.flip_y {
            tile = tile.flip_rows();
        }
        if tile.mask().is_none() {
            let mask = self.derive_mask(tile.data());
            tile = tile.with_mask(mask)?;
        }
        Ok(tile.into())
    }
}

/// Color mapping of numeric tiles, optionally encoded to an image format.
///
/// Tiles with leading dimensions are rendered from their first plane.
#[derive(Debug, Clone)]
pub struct ColorMapping {
    range: ValueRange,
    ramp: Arc<ColorRamp>,
    no_data: Option<f64>,
    format: Option<ImageFormat>,
}

impl ColorMapping {
    /// Map `range` onto `ramp`, producing raw RGBA tiles.
    pub fn new(range: ValueRange, ramp: Arc<ColorRamp>) -> Self {
        Self {
            range,
            ramp,
            no_data: None,
            format: None,
        }
    }

    /// Encode tiles to `format` instead of returning raw RGBA.
    pub fn with_format(mut self, format: Option<ImageFormat>) -> Self {
        self.format = format;
        self
    }

    /// Treat `no_data` as masked in tiles that carry no mask.
    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Map a numeric tile to RGBA pixels.
    pub fn to_rgba(&self, tile: &ArrayTile) -> Result<RgbaTile> {
        let plane;
        let tile = if tile.num_planes() > 1 {
            plane = tile.plane(0)?;
            &plane
        } else {
            tile
        };

        let derived;
        let mask = match (tile.mask(), self.no_data) {
            (Some(mask), _) => Some(mask),
            (None, Some(no_data)) => {
                derived = tile
                    .data()
                    .iter()
                    .map(|&v| v as f64 == no_data)
                    .collect::<Vec<_>>();
                Some(derived.as_slice())
            }
            (None, None) => None,
        };

        let pixels = colorize(tile.data(), mask, tile.width(), self.range, &self.ramp);
        RgbaTile::new(tile.width(), tile.height(), pixels)
    }
}

impl TileTransform for ColorMapping {
    fn transform_tile(
        &self,
        _tile_x: usize,
        _tile_y: usize,
        _rect: PixelRect,
        source: Tile,
    ) -> Result<Tile> {
        let rgba = self.to_rgba(source.as_array()?)?;
        match self.format {
            Some(format) => {
                let data = encode_rgba(rgba.pixels(), rgba.width(), rgba.height(), format)?;
                Ok(EncodedTile { format, data }.into())
            }
            None => Ok(rgba.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_uniform_rgba, create_constant_grid, create_grid_with_nans};

    const RECT: PixelRect = PixelRect::new(0, 0, 0, 0);

    fn array_tile(width: usize, height: usize, data: Vec<f32>) -> Tile {
        ArrayTile::from_2d(width, height, data).unwrap().into()
    }

    fn ramp() -> Arc<ColorRamp> {
        Arc::new(ColorRamp::from_stops("bw", &[[0, 0, 0], [255, 255, 255]], 256).unwrap())
    }

    #[test]
    fn test_flip_remaps_tile_row() {
        let transform = ArrayTransform::new().with_flip_y(true);
        assert_eq!(transform.source_tile(1, 0, Size2D::new(2, 4)), (1, 3));
        assert_eq!(transform.source_tile(1, 3, Size2D::new(2, 4)), (1, 0));
        assert_eq!(ArrayTransform::new().source_tile(1, 3, Size2D::new(2, 4)), (1, 3));
    }

    #[test]
    fn test_mask_priority_no_data_first() {
        let transform = ArrayTransform::new()
            .with_no_data(Some(-999.0))
            .with_valid_range(Some(ValidRange::new(Some(0.0), Some(1.0))));
        let tile = transform
            .transform_tile(0, 0, RECT, array_tile(3, 1, vec![-999.0, 5.0, f32::NAN]))
            .unwrap();
        let mask = tile.as_array().unwrap().mask().unwrap().to_vec();
        // valid range and NaN rules are not applied when no-data is set
        assert_eq!(mask, vec![true, false, false]);
    }

    #[test]
    fn test_mask_from_valid_range() {
        let transform =
            ArrayTransform::new().with_valid_range(Some(ValidRange::new(Some(0.0), None)));
        let tile = transform
            .transform_tile(0, 0, RECT, array_tile(3, 1, vec![-1.0, 0.0, 1e9]))
            .unwrap();
        assert_eq!(tile.as_array().unwrap().mask().unwrap(), &[true, false, false]);
    }

    #[test]
    fn test_mask_from_non_finite() {
        let tile = ArrayTransform::new()
            .transform_tile(0, 0, RECT, array_tile(2, 2, create_grid_with_nans(2, 2, &[(1, 1)])))
            .unwrap();
        assert_eq!(tile.as_array().unwrap().mask().unwrap(), &[false, false, false, true]);
    }

    #[test]
    fn test_existing_mask_kept() {
        let source = ArrayTile::from_2d(2, 1, vec![1.0, 2.0])
            .unwrap()
            .with_mask(vec![false, true])
            .unwrap();
        let tile = ArrayTransform::new()
            .with_no_data(Some(1.0))
            .transform_tile(0, 0, RECT, source.into())
            .unwrap();
        assert_eq!(tile.as_array().unwrap().mask().unwrap(), &[false, true]);
    }

    #[test]
    fn test_flip_and_select_plane() {
        let source = ArrayTile::new(vec![2], 1, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let tile = ArrayTransform::new()
            .with_flip_y(true)
            .with_leading_indices(vec![1])
            .transform_tile(0, 0, RECT, source.clone().into())
            .unwrap();
        assert_eq!(tile.as_array().unwrap().data(), &[4.0, 3.0]);

        let err = ArrayTransform::new()
            .with_leading_indices(vec![0, 0])
            .transform_tile(0, 0, RECT, source.into())
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_color_mapping_constant_tile() {
        let mapping = ColorMapping::new(ValueRange::new(0.0, 10.0), ramp());
        let tile = mapping
            .transform_tile(0, 0, RECT, array_tile(4, 4, create_constant_grid(4, 4, 2.5)))
            .unwrap();
        let rgba = tile.as_rgba().unwrap();
        assert_uniform_rgba!(rgba.pixels(), ramp().color_at(0.25));
    }

    #[test]
    fn test_color_mapping_no_data_transparent() {
        let mapping =
            ColorMapping::new(ValueRange::new(0.0, 1.0), ramp()).with_no_data(Some(0.5));
        let rgba = mapping
            .to_rgba(&ArrayTile::from_2d(2, 1, vec![0.5, 1.0]).unwrap())
            .unwrap();
        assert_eq!(rgba.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(rgba.pixel(0, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn test_color_mapping_encodes() {
        let mapping = ColorMapping::new(ValueRange::new(0.0, 1.0), ramp())
            .with_format(Some(ImageFormat::Png));
        let tile = mapping
            .transform_tile(0, 0, RECT, array_tile(8, 8, create_constant_grid(8, 8, 1.0)))
            .unwrap();
        let encoded = tile.as_encoded().unwrap();
        assert_eq!(encoded.format, ImageFormat::Png);
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_uniform_rgba!(decoded.as_raw(), [255, 255, 255, 255]);
    }

    #[test]
    fn test_color_mapping_rejects_rgba_source() {
        let mapping = ColorMapping::new(ValueRange::new(0.0, 1.0), ramp());
        let source: Tile = RgbaTile::new(1, 1, vec![0; 4]).unwrap().into();
        assert!(mapping.transform_tile(0, 0, RECT, source).is_err());
    }
}
