//! Capacity-bounded cache with a pluggable backing store.
//!
//! ## Eviction
//!
//! Entries are tracked in least-recently-used order (`get` and `put` both
//! count as a use). When a `put` pushes the aggregate size above the
//! capacity, LRU entries are evicted until the size drops to
//! `capacity * threshold`. The entry being inserted is never evicted by its
//! own insert; a single payload larger than the whole capacity is not cached.
//!
//! ## Failures
//!
//! Store errors (e.g. file I/O) are logged and turned into misses or
//! skipped inserts. They never propagate to callers.

use crate::{CacheError, CacheResult, CacheStore, CacheValue, FileCacheStore, MemoryCacheStore};
use lru::LruCache;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default fraction of the capacity eviction shrinks to.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Bookkeeping guarded by the cache mutex.
struct CacheState {
    /// key -> stored size in bytes, in LRU order
    entries: LruCache<String, u64>,
    size: u64,
}

/// Statistics counters.
///
/// All fields are atomic so they can be read without taking the cache lock.
#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    eviction_runs: AtomicU64,
    bytes_evicted_total: AtomicU64,
    store_errors: AtomicU64,
}

/// Point-in-time copy of the cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub eviction_runs: u64,
    pub bytes_evicted_total: u64,
    pub store_errors: u64,
    pub size_bytes: u64,
    pub entry_count: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Generic key -> value cache bounded by aggregate payload size.
pub struct Cache<V> {
    name: String,
    store: Box<dyn CacheStore<V>>,
    capacity: u64,
    threshold: f64,
    state: Mutex<CacheState>,
    counters: CacheCounters,
}

impl<V: CacheValue> Cache<V> {
    /// Create a cache over `store` holding at most `capacity` bytes.
    ///
    /// `threshold` must lie in (0, 1].
    pub fn new(
        store: Box<dyn CacheStore<V>>,
        capacity: u64,
        threshold: f64,
    ) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        Ok(Self {
            name: store.kind().to_string(),
            store,
            capacity,
            threshold,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            counters: CacheCounters::default(),
        })
    }

    /// In-memory cache.
    pub fn memory(capacity: u64, threshold: f64) -> CacheResult<Self> {
        Self::new(Box::new(MemoryCacheStore::new()), capacity, threshold)
    }

    /// File-backed cache writing `{dir}/{hash}{ext}` files.
    pub fn file(
        dir: impl Into<PathBuf>,
        ext: &str,
        capacity: u64,
        threshold: f64,
    ) -> CacheResult<Self> {
        Self::new(Box::new(FileCacheStore::new(dir, ext)?), capacity, threshold)
    }

    /// Name used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up `key`, returning a clone of the cached value.
    pub fn get(&self, key: &str) -> Option<V> {
        let known = self.lock().entries.get(key).is_some();

        if known {
            match self.store.restore_value(key) {
                Ok(Some(value)) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => {
                    // Payload vanished from the store; forget the entry.
                    self.forget(key);
                }
                Err(e) => {
                    self.store_failed("restore", key, &e);
                    self.forget(key);
                }
            }
        } else if self.store.can_load_from_key(key) {
            match self.store.restore_value(key) {
                Ok(Some(value)) => {
                    debug!(cache = %self.name, key = key, "Re-attached stored entry");
                    self.register(key, value.size_bytes());
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => self.store_failed("restore", key, &e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace `key`.
    ///
    /// Evicts LRU entries when the aggregate size exceeds the capacity.
    pub fn put(&self, key: &str, value: V) {
        let size = value.size_bytes();
        if size > self.capacity {
            debug!(
                cache = %self.name,
                key = key,
                size_bytes = size,
                capacity_bytes = self.capacity,
                "Payload larger than cache capacity, not cached"
            );
            self.remove(key);
            return;
        }

        match self.store.store_value(key, &value) {
            Ok(stored) => self.register(key, stored),
            Err(e) => {
                self.store_failed("store", key, &e);
                self.remove(key);
            }
        }
    }

    /// Remove `key`. Returns whether it was tracked.
    ///
    /// A payload the store could re-attach is discarded even when untracked.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.forget(key);
        if removed || self.store.can_load_from_key(key) {
            self.discard(key);
        }
        removed
    }

    /// Whether `key` is currently tracked, without touching LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    /// Drop every entry and reset statistics.
    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut state = self.lock();
            let keys = state.entries.iter().map(|(key, _)| key.clone()).collect();
            state.entries.clear();
            state.size = 0;
            keys
        };
        for key in &keys {
            self.discard(key);
        }
        if let Err(e) = self.store.clear() {
            warn!(cache = %self.name, error = %e, "Failed to clear cache store");
        }

        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.evictions.store(0, Ordering::Relaxed);
        self.counters.eviction_runs.store(0, Ordering::Relaxed);
        self.counters.bytes_evicted_total.store(0, Ordering::Relaxed);
        self.counters.store_errors.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate size of all tracked entries in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.lock().size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Get current statistics.
    pub fn stats(&self) -> CacheStats {
        let (size_bytes, entry_count) = {
            let state = self.lock();
            (state.size, state.entries.len())
        };
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            eviction_runs: self.counters.eviction_runs.load(Ordering::Relaxed),
            bytes_evicted_total: self.counters.bytes_evicted_total.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            size_bytes,
            entry_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `key` with `size` bytes as most recently used, then evict.
    ///
    /// Evicted payloads are discarded after the lock is released.
    fn register(&self, key: &str, size: u64) {
        let evicted = {
            let mut state = self.lock();
            if let Some(old) = state.entries.put(key.to_string(), size) {
                state.size = state.size.saturating_sub(old);
            }
            state.size += size;
            if state.size > self.capacity {
                self.evict_locked(&mut state)
            } else {
                Vec::new()
            }
        };
        for key in &evicted {
            self.discard(key);
        }
    }

    /// Stop tracking `key`. Returns whether it was tracked.
    fn forget(&self, key: &str) -> bool {
        let mut state = self.lock();
        match state.entries.pop(key) {
            Some(size) => {
                state.size = state.size.saturating_sub(size);
                true
            }
            None => false,
        }
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.store.discard_value(key) {
            self.store_failed("discard", key, &e);
        }
    }

    /// Untrack LRU entries until the size is at most `capacity * threshold`
    /// and return their keys.
    ///
    /// The most recently used entry (the one just inserted) is kept.
    fn evict_locked(&self, state: &mut CacheState) -> Vec<String> {
        let target = (self.capacity as f64 * self.threshold) as u64;
        let size_before = state.size;
        let mut evicted = Vec::new();

        while state.size > target && state.entries.len() > 1 {
            let Some((key, size)) = state.entries.pop_lru() else {
                break;
            };
            state.size = state.size.saturating_sub(size);
            evicted.push(key);
        }
        let entries_evicted = evicted.len() as u64;

        let bytes_freed = size_before - state.size;
        self.counters
            .evictions
            .fetch_add(entries_evicted, Ordering::Relaxed);
        self.counters.eviction_runs.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_evicted_total
            .fetch_add(bytes_freed, Ordering::Relaxed);

        info!(
            cache = %self.name,
            entries_evicted = entries_evicted,
            bytes_freed = bytes_freed,
            cache_size_bytes = state.size,
            capacity_bytes = self.capacity,
            "Cache eviction completed"
        );
        evicted
    }

    fn store_failed(&self, op: &str, key: &str, error: &CacheError) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            cache = %self.name,
            store = self.store.kind(),
            op = op,
            key = key,
            error = %error,
            "Cache store operation failed, treating as miss"
        );
    }
}
