//! Scalar tile to RGBA color mapping.

use crate::ColorRamp;
use rayon::prelude::*;

/// Fully transparent pixel used for masked and invalid cells.
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Rows per rayon work item.
const ROWS_PER_TASK: usize = 32;

/// Linear normalization of `[value_min, value_max]` onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Clip `value` to the range, then normalize.
    ///
    /// A zero-width, inverted or non-finite range maps every value to 0.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        let width = self.max - self.min;
        if !self.is_valid() || width <= 0.0 {
            return 0.0;
        }
        (value.clamp(self.min, self.max) - self.min) / width
    }
}

/// Map `values` (row-major, `width` columns) to RGBA bytes.
///
/// Cells that are masked (`mask[i] == true`) or not finite become
/// [`TRANSPARENT`]. When the range bounds themselves are not finite the
/// whole tile is transparent.
pub fn colorize(
    values: &[f32],
    mask: Option<&[bool]>,
    width: usize,
    range: ValueRange,
    ramp: &ColorRamp,
) -> Vec<u8> {
    let mut pixels = vec![0u8; values.len() * 4];
    if !range.is_valid() || values.is_empty() {
        return pixels;
    }

    let width = width.max(1);
    let task_pixels = width * ROWS_PER_TASK;

    pixels
        .par_chunks_mut(task_pixels * 4)
        .enumerate()
        .for_each(|(task, out)| {
            let start = task * task_pixels;
            for (i, px) in out.chunks_exact_mut(4).enumerate() {
                let idx = start + i;
                let value = values[idx];
                let masked = mask.map(|m| m[idx]).unwrap_or(false);
                let color = if masked || !value.is_finite() {
                    TRANSPARENT
                } else {
                    ramp.color_at(range.normalize(value as f64))
                };
                px.copy_from_slice(&color);
            }
        });

    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_uniform_rgba, create_constant_grid, create_grid_with_nans};

    #[test]
    fn test_normalize_non_finite_bounds() {
        assert_eq!(ValueRange::new(f64::NAN, 1.0).normalize(0.5), 0.0);
        assert_eq!(ValueRange::new(0.0, f64::NAN).normalize(0.5), 0.0);
        assert_eq!(ValueRange::new(f64::NEG_INFINITY, 1.0).normalize(0.5), 0.0);
        assert_eq!(ValueRange::new(2.0, 2.0).normalize(5.0), 0.0);
        assert_eq!(ValueRange::new(0.0, 2.0).normalize(5.0), 1.0);
        assert_eq!(ValueRange::new(0.0, 2.0).normalize(0.5), 0.25);
    }

    fn ramp() -> ColorRamp {
        ColorRamp::from_stops("bw", &[[0, 0, 0], [255, 255, 255]], 256).unwrap()
    }

    #[test]
    fn test_constant_tile_is_uniform() {
        let values = create_constant_grid(8, 8, 4.0);
        let pixels = colorize(&values, None, 8, ValueRange::new(0.0, 10.0), &ramp());
        assert_uniform_rgba!(&pixels, ramp().color_at(0.4));
    }

    #[test]
    fn test_values_are_clipped() {
        let values = vec![-5.0, 15.0];
        let pixels = colorize(&values, None, 2, ValueRange::new(0.0, 10.0), &ramp());
        assert_eq!(&pixels[0..4], &ramp().color_at(0.0));
        assert_eq!(&pixels[4..8], &ramp().color_at(1.0));
    }

    #[test]
    fn test_masked_and_nan_are_transparent() {
        let values = create_grid_with_nans(4, 1, &[(1, 0)]);
        let mask = [false, false, true, false];
        let pixels = colorize(&values, Some(&mask), 4, ValueRange::new(0.0, 1.0), &ramp());
        assert_eq!(&pixels[0..4], &[0, 0, 0, 255]);
        assert_eq!(&pixels[4..8], &TRANSPARENT);
        assert_eq!(&pixels[8..12], &TRANSPARENT);
        assert_eq!(&pixels[12..16], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_zero_width_range() {
        let values = create_constant_grid(3, 3, 5.0);
        let pixels = colorize(&values, None, 3, ValueRange::new(5.0, 5.0), &ramp());
        assert_uniform_rgba!(&pixels, ramp().color_at(0.0));
    }

    #[test]
    fn test_invalid_range_is_transparent() {
        let values = create_constant_grid(3, 3, 5.0);
        let pixels = colorize(&values, None, 3, ValueRange::new(f64::NAN, 5.0), &ramp());
        assert_uniform_rgba!(&pixels, TRANSPARENT);
    }

    #[test]
    fn test_large_tile_parallel_rows() {
        let values = create_constant_grid(256, 256, 1.0);
        let pixels = colorize(&values, None, 256, ValueRange::new(0.0, 1.0), &ramp());
        assert_eq!(pixels.len(), 256 * 256 * 4);
        assert_uniform_rgba!(&pixels, [255, 255, 255, 255]);
    }
}
