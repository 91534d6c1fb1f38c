//! Persistence contract for the address cache.
//!
//! The registry hands a [`CacheSnapshot`] to a [`CacheStore`] after every
//! cache write and asks for one back at startup. The store decides the
//! format. Absence of prior state is not an error: `load()` returns
//! `Ok(None)`.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::address_cache::CacheKey;
use crate::error::PersistenceError;
use crate::geo::Address;

/// A single cached resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub address: Address,
}

/// Everything a store needs to rebuild the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Crate version that wrote the snapshot (format may change).
    pub version: String,

    /// Cached entries, in no particular order.
    pub entries: Vec<CacheEntry>,

    /// When the snapshot was taken (secs since UNIX_EPOCH).
    pub created_at_secs: u64,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<CacheEntry>) -> Self {
        let created_at_secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: crate::VERSION.to_string(),
            entries,
            created_at_secs,
        }
    }

    /// Returns true if this snapshot was written by the running version.
    pub fn is_current(&self) -> bool {
        self.version == crate::VERSION
    }
}

/// Backing store for the address cache.
///
/// # Thread Safety
///
/// Stores are shared by the registry across Tokio tasks and must be
/// `Send + Sync`. Calls are short and synchronous.
pub trait CacheStore: Send + Sync {
    /// Load the last saved snapshot, or `None` if nothing was saved.
    fn load(&self) -> Result<Option<CacheSnapshot>, PersistenceError>;

    /// Replace the saved snapshot.
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError>;
}
