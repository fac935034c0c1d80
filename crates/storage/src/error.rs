//! Error types for cache stores.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by cache stores and cache construction.
///
/// Store errors never escape [`crate::Cache::get`] or [`crate::Cache::put`];
/// the cache logs them and degrades to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    // === Store Errors ===
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Value for '{0}' cannot be serialized to bytes")]
    NotSerializable(String),

    #[error("Stored bytes for '{0}' cannot be decoded")]
    Decode(String),

    // === Configuration Errors ===
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
