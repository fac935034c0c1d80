//! Error types for pyramid construction and tile computation.

use renderer::RenderError;
use storage::CacheError;
use thiserror::Error;
use tile_common::TileError;

/// Result type alias using PyramidError.
pub type Result<T> = std::result::Result<T, PyramidError>;

/// Errors that can occur while building pyramids or computing tiles.
#[derive(Error, Debug)]
pub enum PyramidError {
    // === Request Errors ===
    /// The array cannot be rendered as an image.
    #[error("array must have at least 2 dimensions, got shape {shape:?}")]
    InvalidDimensions { shape: Vec<usize> },

    #[error("expected {expected} leading indices, got {actual}")]
    LeadingIndices { expected: usize, actual: usize },

    #[error("leading index {index} out of range for dimension {dim} of size {size}")]
    LeadingIndexOutOfRange { dim: usize, index: usize, size: usize },

    #[error("tile ({tile_x}, {tile_y}) outside image '{image_id}' with {num_tiles_x}x{num_tiles_y} tiles")]
    TileOutOfRange {
        image_id: String,
        tile_x: usize,
        tile_y: usize,
        num_tiles_x: usize,
        num_tiles_y: usize,
    },

    #[error("level {level} outside pyramid with {num_levels} levels")]
    LevelOutOfRange { level: usize, num_levels: usize },

    // === Computation Errors ===
    /// The raster array could not deliver a window.
    #[error("failed to read array window: {0}")]
    ArrayRead(String),

    /// A node received a tile of a kind it cannot process.
    #[error("expected {expected} tile, got {actual} tile")]
    TileKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// Data length does not match the declared shape.
    #[error("invalid tile shape: {0}")]
    Shape(String),

    // === Wrapped Errors ===
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PyramidError {
    /// Create an ArrayRead error.
    pub fn array_read(msg: impl Into<String>) -> Self {
        Self::ArrayRead(msg.into())
    }

    /// Create a Shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            PyramidError::InvalidDimensions { .. }
            | PyramidError::LeadingIndices { .. }
            | PyramidError::LeadingIndexOutOfRange { .. }
            | PyramidError::TileOutOfRange { .. }
            | PyramidError::LevelOutOfRange { .. } => true,
            PyramidError::Render(e) => e.is_client_error(),
            PyramidError::Tile(e) => e.http_status_code() == 400,
            _ => false,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}
