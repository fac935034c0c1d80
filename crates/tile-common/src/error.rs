//! Error types for extent and tile grid derivation.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Errors raised while deriving geographic extents and tiling schemes.
#[derive(Debug, Error)]
pub enum TileError {
    // === Coordinate Errors ===
    #[error("Not enough coordinates for '{axis}': need at least 2, got {count}")]
    TooFewCoordinates { axis: &'static str, count: usize },

    #[error("Degenerate spacing in '{axis}' coordinates: {message}")]
    DegenerateSpacing { axis: &'static str, message: String },

    #[error("Invalid geographic extent: {0}")]
    InvalidExtent(String),

    // === Tiling Errors ===
    #[error("Invalid tile grid: {0}")]
    InvalidTileGrid(String),

    #[error("Unknown tiling scheme format: {0}")]
    UnsupportedFormat(String),
}

impl TileError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::UnsupportedFormat(_) => 400,
            _ => 500,
        }
    }
}
