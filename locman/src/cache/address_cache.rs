//! Address cache keyed by query string or coordinate.
//!
//! One store answers both key kinds:
//! - query keys match on the normalized string (trimmed, lower-cased,
//!   whitespace collapsed)
//! - coordinate keys match the nearest cached coordinate within the
//!   configured precision, so nearby fixes share one entry

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::traits::{CacheEntry, CacheSnapshot};
use crate::geo::{Address, Coordinate, Location};

/// Key under which a resolved address is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheKey {
    /// A normalized free-form query.
    Query(String),
    /// A position, compared by distance threshold.
    Coordinate(Coordinate),
}

impl CacheKey {
    /// Key for a free-form query.
    pub fn query(raw: &str) -> Self {
        CacheKey::Query(normalize_query(raw))
    }

    /// Key for a fix.
    pub fn location(location: &Location) -> Self {
        CacheKey::Coordinate(location.coordinate)
    }
}

/// Normalize a query for exact matching.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Mapping from [`CacheKey`] to [`Address`].
#[derive(Debug, Clone)]
pub struct AddressCache {
    precision_meters: f64,
    queries: HashMap<String, Address>,
    coordinates: Vec<(Coordinate, Address)>,
}

impl AddressCache {
    /// Create an empty cache with the given coordinate precision in metres.
    pub fn new(precision_meters: f64) -> Self {
        Self {
            precision_meters,
            queries: HashMap::new(),
            coordinates: Vec::new(),
        }
    }

    pub fn precision_meters(&self) -> f64 {
        self.precision_meters
    }

    /// Look up an address.
    pub fn get(&self, key: &CacheKey) -> Option<Address> {
        match key {
            CacheKey::Query(query) => self.queries.get(&normalize_query(query)).cloned(),
            CacheKey::Coordinate(coordinate) => self
                .nearest(coordinate)
                .map(|index| self.coordinates[index].1.clone()),
        }
    }

    /// Store an address, replacing any entry the key already hits.
    pub fn set(&mut self, key: CacheKey, address: Address) {
        match key {
            CacheKey::Query(query) => {
                self.queries.insert(normalize_query(&query), address);
            }
            CacheKey::Coordinate(coordinate) => match self.nearest(&coordinate) {
                Some(index) => self.coordinates[index] = (coordinate, address),
                None => self.coordinates.push((coordinate, address)),
            },
        }
    }

    /// Number of cached entries across both key kinds.
    pub fn len(&self) -> usize {
        self.queries.len() + self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every entry into a persistable snapshot.
    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = self
            .queries
            .iter()
            .map(|(query, address)| CacheEntry {
                key: CacheKey::Query(query.clone()),
                address: address.clone(),
            })
            .chain(self.coordinates.iter().map(|(coordinate, address)| CacheEntry {
                key: CacheKey::Coordinate(*coordinate),
                address: address.clone(),
            }))
            .collect();

        CacheSnapshot::new(entries)
    }

    /// Merge a snapshot into the cache.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        for entry in snapshot.entries {
            self.set(entry.key, entry.address);
        }
    }

    fn nearest(&self, coordinate: &Coordinate) -> Option<usize> {
        self.coordinates
            .iter()
            .enumerate()
            .map(|(index, (cached, _))| (index, cached.distance_to(coordinate)))
            .filter(|(_, distance)| *distance <= self.precision_meters)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{City, Country};
    use proptest::prelude::*;

    fn address(street: &str, lat: f64, lon: f64) -> Address {
        Address::new(
            City::new("London", Country::new("GB", "United Kingdom")),
            street,
            "",
            Coordinate::new(lat, lon),
        )
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  10  Downing\tSt "), "10 downing st");
    }

    #[test]
    fn test_query_roundtrip_is_normalized() {
        let mut cache = AddressCache::new(200.0);
        let downing = address("Downing Street 10", 51.5034, -0.1276);

        cache.set(CacheKey::query("10 Downing St"), downing.clone());

        assert_eq!(cache.get(&CacheKey::query("10 downing  st")), Some(downing));
        assert_eq!(cache.get(&CacheKey::query("221B Baker St")), None);
    }

    #[test]
    fn test_location_hit_within_precision() {
        let mut cache = AddressCache::new(200.0);
        let downing = address("Downing Street 10", 51.5034, -0.1276);
        cache.set(CacheKey::location(&Location::new(51.5034, -0.1276)), downing.clone());

        // ~110m away
        let nearby = Location::new(51.5044, -0.1276);
        assert_eq!(cache.get(&CacheKey::location(&nearby)), Some(downing));

        // ~5km away
        let far = Location::new(51.5500, -0.1276);
        assert_eq!(cache.get(&CacheKey::location(&far)), None);
    }

    #[test]
    fn test_set_near_existing_replaces_entry() {
        let mut cache = AddressCache::new(200.0);
        cache.set(
            CacheKey::Coordinate(Coordinate::new(51.5034, -0.1276)),
            address("Old", 51.5034, -0.1276),
        );
        cache.set(
            CacheKey::Coordinate(Coordinate::new(51.5035, -0.1276)),
            address("New", 51.5035, -0.1276),
        );

        assert_eq!(cache.len(), 1);
        let hit = cache
            .get(&CacheKey::Coordinate(Coordinate::new(51.5034, -0.1276)))
            .unwrap();
        assert_eq!(hit.street(), "New");
    }

    #[test]
    fn test_nearest_entry_wins() {
        let mut cache = AddressCache::new(500.0);
        cache.set(
            CacheKey::Coordinate(Coordinate::new(51.5000, -0.1276)),
            address("South", 51.5000, -0.1276),
        );
        cache.set(
            CacheKey::Coordinate(Coordinate::new(51.5080, -0.1276)),
            address("North", 51.5080, -0.1276),
        );

        let hit = cache
            .get(&CacheKey::Coordinate(Coordinate::new(51.5060, -0.1276)))
            .unwrap();
        assert_eq!(hit.street(), "North");
    }

    #[test]
    fn test_snapshot_restore() {
        let mut cache = AddressCache::new(200.0);
        cache.set(CacheKey::query("Baker St"), address("Baker Street", 51.5238, -0.1586));
        cache.set(
            CacheKey::Coordinate(Coordinate::new(51.5238, -0.1586)),
            address("Baker Street", 51.5238, -0.1586),
        );

        let mut restored = AddressCache::new(200.0);
        restored.restore(cache.snapshot());

        assert_eq!(restored.len(), 2);
        assert!(restored.get(&CacheKey::query("baker st")).is_some());
    }

    proptest! {
        #[test]
        fn prop_location_keys_hit_within_threshold(
            lat in -60.0f64..60.0,
            lon in -170.0f64..170.0,
            offset in 0.0f64..0.0009,
        ) {
            let mut cache = AddressCache::new(200.0);
            let cached = address("Somewhere", lat, lon);
            cache.set(CacheKey::Coordinate(Coordinate::new(lat, lon)), cached.clone());

            // A latitude offset below 0.0009 degrees is under 100m.
            let probe = Coordinate::new(lat + offset, lon);
            prop_assert_eq!(cache.get(&CacheKey::Coordinate(probe)), Some(cached));
        }

        #[test]
        fn prop_query_roundtrip(query in "[a-zA-Z0-9 ,]{1,40}") {
            let mut cache = AddressCache::new(200.0);
            let cached = address("Anywhere", 0.0, 0.0);
            cache.set(CacheKey::query(&query), cached.clone());

            prop_assert_eq!(cache.get(&CacheKey::query(&query)), Some(cached));
        }
    }
}
