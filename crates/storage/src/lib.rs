//! Tile cache storage.
//!
//! Provides a generic, size-bounded [`Cache`] over pluggable backing stores:
//! - [`MemoryCacheStore`]: payloads kept in process memory
//! - [`FileCacheStore`]: payloads written to one file per key

pub mod cache;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use cache::{Cache, CacheStats, DEFAULT_THRESHOLD};
pub use error::{CacheError, CacheResult};
pub use file::{hash_key, FileCacheStore};
pub use memory::MemoryCacheStore;
pub use store::{CacheStore, CacheValue};
