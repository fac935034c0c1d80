//! Input rasters: raw little-endian `f32` files or synthetic fields.

use anyhow::{bail, Context, Result};
use pyramid::{ArrayRef, InMemoryArray};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Synthetic field patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// `sin(x) * cos(y)` in [-1, 1]
    Wave,
    /// Rising from 0 (top-left) to 1 (bottom-right)
    Gradient,
}

impl FromStr for Pattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "wave" => Ok(Pattern::Wave),
            "gradient" => Ok(Pattern::Gradient),
            _ => bail!("unknown pattern '{}', expected wave or gradient", s),
        }
    }
}

/// Generate a `width` x `height` field.
pub fn synthetic(pattern: Pattern, width: usize, height: usize) -> Result<ArrayRef> {
    let span = (width + height).saturating_sub(2).max(1) as f32;
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let value = match pattern {
                Pattern::Wave => {
                    let x = col as f32 / width as f32 * std::f32::consts::TAU;
                    let y = row as f32 / height as f32 * std::f32::consts::PI;
                    x.sin() * y.cos()
                }
                Pattern::Gradient => (row + col) as f32 / span,
            };
            data.push(value);
        }
    }
    Ok(Arc::new(InMemoryArray::from_2d(width, height, data)?))
}

/// Read a row-major raw file of little-endian `f32` samples.
pub fn read_raw(path: &Path, width: usize, height: usize) -> Result<ArrayRef> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let expected = width * height * 4;
    if bytes.len() != expected {
        bail!(
            "{} holds {} bytes, expected {} for {}x{} f32 samples",
            path.display(),
            bytes.len(),
            expected,
            width,
            height
        );
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Arc::new(InMemoryArray::from_2d(width, height, data)?))
}

/// Centers of `n` equal cells spanning `start..end`.
pub fn cell_centers(start: f64, end: f64, n: usize) -> Vec<f64> {
    let res = (end - start) / n as f64;
    (0..n).map(|i| start + (i as f64 + 0.5) * res).collect()
}
