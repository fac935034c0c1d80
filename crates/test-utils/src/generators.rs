//! Synthetic raster generators.
//!
//! These generators create predictable, verifiable value patterns that can
//! be used across the test suite. All grids are row-major (row 0 first).

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that tiles are cut, flipped and strided
/// correctly by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a grid with values rising from `min` (top-left) to `max`
/// (bottom-right).
pub fn create_gradient_grid(width: usize, height: usize, min: f32, max: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    let span = (width + height).saturating_sub(2).max(1) as f32;
    for row in 0..height {
        for col in 0..width {
            let t = (row + col) as f32 / span;
            data.push(min + t * (max - min));
        }
    }
    data
}

/// Creates a smooth wave pattern with values in `[-1, 1]`, similar to a
/// geophysical field.
pub fn create_wave_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = col as f32 / width.max(1) as f32 * std::f32::consts::TAU;
            let y = row as f32 / height.max(1) as f32 * std::f32::consts::PI;
            data.push(x.sin() * y.cos());
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid with NaN values at specified positions.
///
/// `nan_positions` holds `(col, row)` pairs; all other cells are zero.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}

/// Creates RGBA pixel data for a gradient pattern (many colors).
pub fn create_test_rgba_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = 128u8;
            let a = 255u8;
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }
    pixels
}

/// Creates RGBA pixel data using only `num_colors` distinct opaque colors,
/// suitable for testing indexed PNG encoding.
pub fn create_palette_pixels(width: usize, height: usize, num_colors: usize) -> Vec<u8> {
    let num_colors = num_colors.clamp(1, 256);
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let idx = ((x + y) % num_colors) as u8;
            pixels.extend_from_slice(&[idx, 255 - idx, idx / 2, 255]);
        }
    }
    pixels
}
