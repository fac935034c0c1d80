//! Error types for color mapping and image encoding.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using RenderError.
pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    // === Color Ramp Errors ===
    #[error("Unknown color ramp: {0}")]
    UnknownColorRamp(String),

    #[error("Invalid color '{0}': expected #rrggbb")]
    InvalidColor(String),

    #[error("Color ramp '{0}' has no color stops")]
    EmptyColorRamp(String),

    #[error("Failed to read color ramps from {path}: {source}")]
    RampFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse color ramps: {0}")]
    RampParse(#[from] serde_json::Error),

    // === Encoding Errors ===
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Pixel buffer has {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        expected: usize,
        actual: usize,
        width: usize,
        height: usize,
    },

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

impl RenderError {
    /// Whether the error was caused by caller input (bad ramp or format name).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RenderError::UnknownColorRamp(_)
                | RenderError::InvalidColor(_)
                | RenderError::UnsupportedImageFormat(_)
        )
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
