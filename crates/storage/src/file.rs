//! File-backed cache store.
//!
//! Each payload is written to `{dir}/{hash(key):016x}{ext}`. Files written by
//! an earlier process are picked up again through
//! [`CacheStore::can_load_from_key`].

use crate::{CacheError, CacheResult, CacheStore, CacheValue};
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Persists serializable payloads as individual files in one directory.
pub struct FileCacheStore<V> {
    dir: PathBuf,
    ext: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> FileCacheStore<V> {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// `ext` is appended to every file name, e.g. `".png"`; a missing
    /// leading dot is added.
    pub fn new(dir: impl Into<PathBuf>, ext: &str) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        let ext = match ext {
            "" => String::new(),
            ext if ext.starts_with('.') => ext.to_string(),
            ext => format!(".{}", ext),
        };
        Ok(Self {
            dir,
            ext,
            _value: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:016x}{}", hash_key(key), self.ext))
    }

    /// Whether `path` is a payload of this store or a leftover `.part` file
    /// from an interrupted write.
    fn owns(&self, path: &Path) -> bool {
        let hashed = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.len() == 16 && stem.bytes().all(|b| b.is_ascii_hexdigit()));
        let ext = path.extension().and_then(|ext| ext.to_str());
        let own_ext = Some(self.ext.trim_start_matches('.')).filter(|ext| !ext.is_empty());
        hashed && (ext == own_ext || ext == Some(PART_EXT))
    }
}

const PART_EXT: &str = "part";

impl<V: CacheValue> CacheStore<V> for FileCacheStore<V> {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn store_value(&self, key: &str, value: &V) -> CacheResult<u64> {
        let data = value
            .to_bytes()
            .ok_or_else(|| CacheError::NotSerializable(key.to_string()))?;
        let path = self.path_for(key);
        // Write then rename so readers never see a partial file.
        let part = path.with_extension(PART_EXT);
        fs::write(&part, &data).map_err(|e| CacheError::io(&part, e))?;
        fs::rename(&part, &path).map_err(|e| CacheError::io(&path, e))?;
        Ok(data.len() as u64)
    }

    fn restore_value(&self, key: &str) -> CacheResult<Option<V>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(data) => V::from_bytes(Bytes::from(data))
                .map(Some)
                .ok_or_else(|| CacheError::Decode(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    fn discard_value(&self, key: &str) -> CacheResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    fn can_load_from_key(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn clear(&self) -> CacheResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if self.owns(&path) && path.is_file() {
                fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

/// Stable hash of a cache key, used as the file name.
pub fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::scratch_dir;

    #[test]
    fn test_file_round_trip() {
        let dir = scratch_dir();
        let store = FileCacheStore::<Bytes>::new(dir.path(), ".bin").unwrap();

        let size = store
            .store_value("ds/var/0/1/2", &Bytes::from_static(b"payload"))
            .unwrap();
        assert_eq!(size, 7);

        let path = store.path_for("ds/var/0/1/2");
        assert!(path.is_file());
        assert!(path.to_string_lossy().ends_with(".bin"));
        assert!(CacheStore::<Bytes>::can_load_from_key(&store, "ds/var/0/1/2"));

        let restored = store.restore_value("ds/var/0/1/2").unwrap();
        assert_eq!(restored, Some(Bytes::from_static(b"payload")));

        store.discard_value("ds/var/0/1/2").unwrap();
        assert!(!path.exists());
        assert_eq!(store.restore_value("ds/var/0/1/2").unwrap(), None);
    }

    #[test]
    fn test_clear_only_removes_own_files() {
        let dir = scratch_dir();
        let store = FileCacheStore::<Bytes>::new(dir.path(), ".png").unwrap();
        store.store_value("a", &Bytes::from_static(b"1")).unwrap();
        store.store_value("b", &Bytes::from_static(b"2")).unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        CacheStore::<Bytes>::clear(&store).unwrap();
        assert!(!store.path_for("a").exists());
        assert!(!store.path_for("b").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_clear_without_extension_keeps_foreign_files() {
        let dir = scratch_dir();
        let store = FileCacheStore::<Bytes>::new(dir.path(), "").unwrap();
        store.store_value("a", &Bytes::from_static(b"1")).unwrap();
        let stale = store.path_for("b").with_extension("part");
        fs::write(&stale, b"partial").unwrap();
        fs::write(dir.path().join("README"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        CacheStore::<Bytes>::clear(&store).unwrap();
        assert!(!store.path_for("a").exists());
        assert!(!stale.exists());
        assert!(dir.path().join("README").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_clear_removes_stale_part_files() {
        let dir = scratch_dir();
        let store = FileCacheStore::<Bytes>::new(dir.path(), "png").unwrap();
        store.store_value("a", &Bytes::from_static(b"1")).unwrap();
        assert!(store.path_for("a").to_string_lossy().ends_with(".png"));
        let stale = store.path_for("b").with_extension("part");
        fs::write(&stale, b"partial").unwrap();
        fs::write(dir.path().join("logo.png"), b"x").unwrap();

        CacheStore::<Bytes>::clear(&store).unwrap();
        assert!(!store.path_for("a").exists());
        assert!(!stale.exists());
        assert!(dir.path().join("logo.png").exists());
    }

    #[test]
    fn test_hash_key_is_stable() {
        assert_eq!(hash_key("x/0/0"), hash_key("x/0/0"));
        assert_ne!(hash_key("x/0/0"), hash_key("x/0/1"));
    }
}
