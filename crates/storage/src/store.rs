//! Value and backing-store contracts for [`crate::Cache`].

use crate::CacheResult;
use bytes::Bytes;

/// A value that can be held by a [`crate::Cache`].
///
/// Values are cloned out of the cache, so they should be cheap to clone
/// (`Bytes`, `Arc`-backed buffers).
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// Size in bytes counted against the cache capacity.
    fn size_bytes(&self) -> u64;

    /// Serialized form for byte-oriented stores. `None` if not serializable.
    fn to_bytes(&self) -> Option<Bytes> {
        None
    }

    /// Rebuild a value from its serialized form.
    fn from_bytes(_bytes: Bytes) -> Option<Self> {
        None
    }
}

impl CacheValue for Bytes {
    fn size_bytes(&self) -> u64 {
        self.len() as u64
    }

    fn to_bytes(&self) -> Option<Bytes> {
        Some(self.clone())
    }

    fn from_bytes(bytes: Bytes) -> Option<Self> {
        Some(bytes)
    }
}

/// Backing storage for cache payloads.
///
/// The cache owns size accounting and eviction order; stores only hold
/// the payloads. Implementations must be safe to call from many threads.
pub trait CacheStore<V>: Send + Sync {
    /// Short store name used in logs.
    fn kind(&self) -> &'static str;

    /// Persist `value` under `key`, returning the number of bytes stored.
    fn store_value(&self, key: &str, value: &V) -> CacheResult<u64>;

    /// Fetch the value stored under `key`, `None` if absent.
    fn restore_value(&self, key: &str) -> CacheResult<Option<V>>;

    /// Drop the value stored under `key`. Absent keys are not an error.
    fn discard_value(&self, key: &str) -> CacheResult<()>;

    /// Whether the store holds `key` from outside the cache's bookkeeping,
    /// e.g. a file written by an earlier process.
    fn can_load_from_key(&self, _key: &str) -> bool {
        false
    }

    /// Drop every stored value.
    fn clear(&self) -> CacheResult<()>;
}
