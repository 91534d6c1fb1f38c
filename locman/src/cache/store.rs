//! Cache store implementations.
//!
//! - [`FileCacheStore`]: bincode snapshot on disk, written atomically
//! - [`MemoryCacheStore`]: in-process snapshot, for tests and ephemeral use

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::traits::{CacheSnapshot, CacheStore};
use crate::error::PersistenceError;

/// Get the default cache file path.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".locman").join("address.cache"))
}

/// Suffix counter for temp files, unique within the process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Address cache persisted to a single file.
///
/// Saves through one store (and its clones) are serialized. Each save
/// writes its own temp file before renaming it over the cache file.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_extension(format!("{}-{}.tmp", std::process::id(), sequence))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self) -> Result<Option<CacheSnapshot>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let snapshot: CacheSnapshot = bincode::deserialize_from(reader)
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;

        if !snapshot.is_current() {
            tracing::debug!(
                path = %self.path.display(),
                version = %snapshot.version,
                "Ignoring address cache written by another version"
            );
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let _guard = self.write_lock.lock();

        // Write to temp file first, then rename for atomicity
        let temp_path = self.temp_path();
        let written = write_snapshot_file(&temp_path, snapshot)
            .and_then(|()| std::fs::rename(&temp_path, &self.path).map_err(PersistenceError::from));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        tracing::debug!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "Saved address cache"
        );

        Ok(())
    }
}

fn write_snapshot_file(path: &Path, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);

    bincode::serialize_into(&mut writer, snapshot)
        .map_err(|e| PersistenceError::Encode(e.to_string()))?;
    writer.flush()?;
    Ok(())
}

/// Address cache kept in memory.
///
/// Can be made to fail every save, which exercises the registry's
/// log-and-continue handling.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    snapshot: Mutex<Option<CacheSnapshot>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a snapshot.
    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Create a store whose saves always fail.
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Number of save attempts, successful or not.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// The last saved snapshot.
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.snapshot.lock().clone()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self) -> Result<Option<CacheSnapshot>, PersistenceError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        self.saves.fetch_add(1, Ordering::Relaxed);

        if self.failing.load(Ordering::Relaxed) {
            return Err(PersistenceError::Io(std::io::Error::other(
                "memory store configured to fail",
            )));
        }

        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AddressCache, CacheKey};
    use crate::geo::{Address, City, Coordinate, Country};
    use tempfile::TempDir;

    fn populated_cache() -> AddressCache {
        let mut cache = AddressCache::new(200.0);
        let address = Address::new(
            City::new("København", Country::new("DK", "Danmark")),
            "Rådhuspladsen 1",
            "1550",
            Coordinate::new(55.6761, 12.5683),
        );
        cache.set(CacheKey::query("København, Danmark"), address.clone());
        cache.set(CacheKey::Coordinate(address.coordinate()), address);
        cache
    }

    #[test]
    fn test_file_store_missing_file_loads_none() {
        let temp = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp.path().join("missing.cache"));

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp.path().join("nested").join("address.cache"));
        let cache = populated_cache();

        store.save(&cache.snapshot()).unwrap();
        let loaded = store.load().unwrap().unwrap();

        let mut restored = AddressCache::new(200.0);
        restored.restore(loaded);
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored
                .get(&CacheKey::query("københavn, danmark"))
                .unwrap()
                .zip_code(),
            "1550"
        );
        let leftovers = std::fs::read_dir(temp.path().join("nested"))
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_file_store_corrupt_file_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("address.cache");
        std::fs::write(&path, b"definitely not bincode").unwrap();

        let result = FileCacheStore::new(path).load();
        assert!(matches!(result, Err(PersistenceError::Decode(_))));
    }

    #[test]
    fn test_file_store_ignores_other_versions() {
        let temp = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp.path().join("address.cache"));
        let mut snapshot = populated_cache().snapshot();
        snapshot.version = "0.0.1".to_string();

        store.save(&snapshot).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_concurrent_saves_stay_readable() {
        let temp = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp.path().join("address.cache"));

        for round in 0..20 {
            let handles: Vec<_> = (0..4)
                .map(|worker| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        let mut cache = populated_cache();
                        let address = Address::new(
                            City::new("Aarhus", Country::new("DK", "Danmark")),
                            format!("Street {}", worker),
                            "8000",
                            Coordinate::new(56.1629, 10.2039 + worker as f64),
                        );
                        cache.set(CacheKey::Coordinate(address.coordinate()), address);
                        store.save(&cache.snapshot())
                    })
                })
                .collect();

            for handle in handles {
                assert!(handle.join().unwrap().is_ok(), "save failed in round {}", round);
            }

            let loaded = store.load().unwrap().unwrap();
            assert_eq!(loaded.entries.len(), 3);
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryCacheStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&populated_cache().snapshot()).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap().unwrap().entries.len(), 2);
    }

    #[test]
    fn test_failing_memory_store() {
        let store = MemoryCacheStore::failing();

        assert!(store.save(&populated_cache().snapshot()).is_err());
        assert_eq!(store.save_count(), 1);
        assert!(store.snapshot().is_none());
    }
}
