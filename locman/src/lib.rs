//! Locman - location and geocoding facade
//!
//! This library sits between an application and two slow, external
//! collaborators: a device location provider and a geocoding provider. It
//! decides *when* those collaborators are called and fans their results out to
//! any number of subscribers.
//!
//! # Architecture
//!
//! ```text
//!  LocationSource ──► LocationSink ──► Registry ──► Location listeners
//!                                        │
//!  resolve_address ──► AddressCache ─────┤ hit ──► handler
//!                          │ miss        │
//!                          ▼             │
//!                   ResolutionGate ──► Geocoder (one call in flight)
//!                          │                 │
//!                   PendingRequestQueue ◄────┘ completion: cache, broadcast,
//!                                              answer waiters, drain next
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use locman::{LocationManager, ManagerConfig, ListenerOptions};
//! use locman::cache::MemoryCacheStore;
//! use locman::provider::{ManualLocationSource, StaticGeocoder};
//!
//! let manager = LocationManager::new(
//!     ManagerConfig::default(),
//!     Arc::new(ManualLocationSource::new()),
//!     Arc::new(StaticGeocoder::new(vec![])),
//!     Arc::new(MemoryCacheStore::new()),
//! )?;
//!
//! manager.start();
//! let listener = manager.subscribe_location(
//!     |result| println!("location: {:?}", result),
//!     ListenerOptions::default(),
//! );
//! manager.resolve_address("København, Danmark", |result| println!("{:?}", result));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod geo;
pub mod listener;
pub mod logging;
pub mod provider;
pub mod registry;

pub use config::{ManagerConfig, ThrottlePolicy};
pub use error::{LocationError, PersistenceError, SetupError};
pub use facade::{LocationManager, UpdateMode};
pub use geo::{Address, City, Coordinate, Country, Location};
pub use listener::{Listener, ListenerId, ListenerKind, ListenerOptions};
pub use registry::{Registry, RequestKey, ResolutionState};

/// Crate version, recorded in persisted cache snapshots.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
