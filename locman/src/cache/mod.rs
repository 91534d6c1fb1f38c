//! Address cache and its persistence.
//!
//! [`AddressCache`] maps a query string or a coordinate to a resolved
//! [`Address`](crate::geo::Address). It lives inside the registry's locked
//! state; [`CacheStore`] implementations save and load it.
//!
//! # Available Stores
//!
//! - [`FileCacheStore`]: bincode file with atomic replace
//! - [`MemoryCacheStore`]: in-process, optionally failing

mod address_cache;
mod store;
mod traits;

pub use address_cache::{normalize_query, AddressCache, CacheKey};
pub use store::{default_cache_path, FileCacheStore, MemoryCacheStore};
pub use traits::{CacheEntry, CacheSnapshot, CacheStore};
