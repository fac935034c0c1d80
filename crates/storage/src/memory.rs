//! In-memory cache store.

use crate::{CacheResult, CacheStore, CacheValue};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Keeps payloads in a hash map; entries are lost on process restart.
pub struct MemoryCacheStore<V> {
    values: RwLock<HashMap<String, V>>,
}

impl<V> MemoryCacheStore<V> {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryCacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: CacheValue> CacheStore<V> for MemoryCacheStore<V> {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn store_value(&self, key: &str, value: &V) -> CacheResult<u64> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.clone());
        Ok(value.size_bytes())
    }

    fn restore_value(&self, key: &str) -> CacheResult<Option<V>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn discard_value(&self, key: &str) -> CacheResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_store_restore_discard() {
        let store = MemoryCacheStore::<Bytes>::new();
        assert!(store.is_empty());

        let size = store.store_value("a", &Bytes::from_static(b"hello")).unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            store.restore_value("a").unwrap(),
            Some(Bytes::from_static(b"hello"))
        );

        store.discard_value("a").unwrap();
        assert_eq!(store.restore_value("a").unwrap(), None);
        // Discarding an absent key is fine
        store.discard_value("a").unwrap();
    }
}
