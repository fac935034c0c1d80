//! Shared test utilities for the tile pyramid workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic raster generators
//! - Coordinate array generators
//! - Approximate-equality assertion macros
//! - Scratch directories for file-backed caches
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, cell_centers, create_test_grid};
//! ```

pub mod coords;
pub mod generators;

// Re-export commonly used items at the crate root
pub use coords::*;
pub use generators::*;

/// Create a fresh temporary directory for cache tests.
///
/// The directory is removed when the returned guard is dropped.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("tile-cache-test-")
        .tempdir()
        .expect("Failed to create temporary directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro asserting that every RGBA pixel in a buffer equals `expected`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_uniform_rgba;
///
/// assert_uniform_rgba!(&pixels, [0, 0, 0, 0]);
/// ```
#[macro_export]
macro_rules! assert_uniform_rgba {
    ($pixels:expr, $expected:expr) => {{
        let expected: [u8; 4] = $expected;
        for (i, px) in $pixels.chunks_exact(4).enumerate() {
            if px != expected {
                panic!(
                    "assertion failed: pixel {} is {:?}, expected {:?}",
                    i, px, expected
                );
            }
        }
    }};
}
