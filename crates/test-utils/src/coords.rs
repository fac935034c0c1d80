//! Coordinate array generators.

/// `n` evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Centers of `n` equal cells spanning `start..end`.
///
/// `cell_centers(0.0, 5.0, 2000)` yields `0.00125, 0.00375, ..., 4.99875`.
/// A descending range (`start > end`) yields descending centers.
pub fn cell_centers(start: f64, end: f64, n: usize) -> Vec<f64> {
    let res = (end - start) / n as f64;
    (0..n).map(|i| start + (i as f64 + 0.5) * res).collect()
}

/// Bound pairs of `n` equal cells spanning `start..end`.
pub fn cell_bounds(start: f64, end: f64, n: usize) -> Vec<[f64; 2]> {
    let res = (end - start) / n as f64;
    (0..n)
        .map(|i| [start + i as f64 * res, start + (i + 1) as f64 * res])
        .collect()
}

/// Longitude centers starting at `west` and wrapping through 180°.
///
/// Values past 180 are shifted by -360, as in datasets that straddle the
/// antimeridian.
pub fn wrapped_lon_centers(west: f64, width_deg: f64, n: usize) -> Vec<f64> {
    cell_centers(west, west + width_deg, n)
        .into_iter()
        .map(|lon| if lon > 180.0 { lon - 360.0 } else { lon })
        .collect()
}
