//! Listener registry and address resolution core.
//!
//! The [`Registry`] owns all mutable state behind one lock: the last known
//! location and address, the last device error, the listener set, the
//! address cache, the pending request queue and the resolution gate.
//!
//! # Location Path
//!
//! Fixes pushed through a [`LocationSink`] are handled in order on an event
//! loop. A fix identical to the current one is dropped; anything else
//! replaces the current location, clears the last error and is broadcast to
//! every location listener.
//!
//! # Address Path
//!
//! ```text
//! request ──► cache hit ──► handler (inline)
//!    │
//!    └─► miss ──► queue ──► gate idle & throttle open ──► geocoder
//!                                                          │
//!         answer waiters ◄── broadcast ◄── cache ◄── completion
//!                │
//!                └──► dispatch oldest queued request
//! ```
//!
//! At most one geocoder call is outstanding at any time.
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::new(config, Arc::new(geocoder), Arc::new(MemoryCacheStore::new()))?;
//! let listener = registry.listen(
//!     ListenerKind::address(|result| println!("{:?}", result)),
//!     ListenerOptions::default(),
//! );
//! let address = registry.resolve(RequestKey::Query("Paris".into())).await?;
//! listener.unlisten();
//! ```

mod queue;
mod resolver;
mod state;

pub use queue::RequestKey;
pub use state::ResolutionState;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use self::state::RegistryState;
use crate::cache::{AddressCache, CacheStore};
use crate::config::ManagerConfig;
use crate::error::{LocationError, SetupError};
use crate::geo::{Address, Location};
use crate::listener::{
    Listener, ListenerEvent, ListenerId, ListenerKind, ListenerOptions, ListenerShared,
};
use crate::provider::{Geocoder, LocationEvent, LocationSink};

/// Listener registry and resolution pipeline.
pub struct Registry {
    config: ManagerConfig,
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn CacheStore>,
    runtime: Handle,
    state: Mutex<RegistryState>,
    /// Generation of the last snapshot the store accepted. Held while saving.
    persisted: Mutex<u64>,
    me: Weak<Registry>,
}

impl Registry {
    /// Create a registry on the current Tokio runtime.
    ///
    /// Loads the persisted cache; a load failure is logged and the registry
    /// starts empty.
    pub fn new(
        config: ManagerConfig,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Arc<Self>, SetupError> {
        let runtime = Handle::try_current().map_err(|_| SetupError::NoRuntime)?;
        Ok(Self::with_runtime(config, geocoder, store, runtime))
    }

    /// Create a registry that spawns its tasks on `runtime`.
    pub fn with_runtime(
        config: ManagerConfig,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn CacheStore>,
        runtime: Handle,
    ) -> Arc<Self> {
        let mut cache = AddressCache::new(config.cache_precision_meters);
        match store.load() {
            Ok(Some(snapshot)) => {
                let entries = snapshot.entries.len();
                cache.restore(snapshot);
                tracing::info!(entries, "Loaded address cache");
            }
            Ok(None) => tracing::debug!("No persisted address cache"),
            Err(e) => tracing::warn!(error = %e, "Failed to load address cache, starting empty"),
        }

        Arc::new_cyclic(|me| Self {
            config,
            geocoder,
            store,
            runtime,
            state: Mutex::new(RegistryState::new(cache)),
            persisted: Mutex::new(0),
            me: me.clone(),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Subscribe `kind` and activate it.
    ///
    /// If a current value of the listener's kind exists it is delivered
    /// first, exactly once.
    pub fn listen(&self, kind: ListenerKind, options: ListenerOptions) -> Listener {
        Listener::start(ListenerShared::new(
            kind,
            options,
            self.runtime.clone(),
            self.me.clone(),
        ))
    }

    /// Replay the current value to `listener`, then register it unless the
    /// replay completed it.
    pub(crate) fn attach(&self, listener: Arc<ListenerShared>) {
        let mut state = self.state.lock();

        let replay = match listener.kind() {
            ListenerKind::Location(_) => state.location.map(|l| ListenerEvent::Location(Ok(l))),
            ListenerKind::Address(_) => state
                .address
                .clone()
                .map(|a| ListenerEvent::Address(Ok(Some(a)))),
        };

        if let Some(event) = replay {
            tracing::debug!(listener = %listener.id(), "Replaying current value");
            if !listener.emit(event) {
                return;
            }
        }

        // Deactivated concurrently between activation and here.
        if !listener.is_active() {
            return;
        }
        state.listeners.insert(listener.id(), listener);
    }

    pub(crate) fn detach(&self, id: ListenerId) {
        if self.state.lock().listeners.remove(&id).is_some() {
            tracing::debug!(listener = %id, "Listener removed");
        }
    }

    /// Remove every listener.
    pub fn unlisten_all(&self) {
        let listeners = std::mem::take(&mut self.state.lock().listeners);
        let count = listeners.len();
        for listener in listeners.into_values() {
            listener.retire();
        }
        tracing::debug!(count, "Removed all listeners");
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    // =========================================================================
    // Location Path
    // =========================================================================

    /// Open a sink for a device location provider.
    ///
    /// Events are handled in order on a task holding only a weak reference,
    /// so the loop ends when the registry or every sink clone is dropped.
    pub fn open_sink(&self) -> (LocationSink, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = self.me.clone();

        let task = self.runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.handle_event(event);
            }
            tracing::debug!("Location event loop stopped");
        });

        (LocationSink::new(tx), task)
    }

    /// Apply one device provider event.
    pub fn handle_event(&self, event: LocationEvent) {
        match event {
            LocationEvent::Updated(location) => self.update_location(location),
            LocationEvent::Failed(error) => self.fail_location(error),
        }
    }

    fn update_location(&self, location: Location) {
        let mut state = self.state.lock();

        if state
            .location
            .is_some_and(|current| current.same_position(&location))
        {
            tracing::trace!(location = %location.coordinate, "Repeated fix suppressed");
            return;
        }

        state.location = Some(location);
        state.last_error = None;
        let delivered = state.broadcast(&ListenerEvent::Location(Ok(location)));

        let follow = self.config.follow_address
            && state.followed.map_or(true, |followed| {
                !followed.is_within(&location, self.config.follow_distance_meters)
            });
        if follow {
            state.followed = Some(location);
        }
        drop(state);

        tracing::debug!(location = %location.coordinate, delivered, "Location updated");

        if follow {
            self.follow(location);
        }
    }

    fn fail_location(&self, error: LocationError) {
        let mut state = self.state.lock();
        state.last_error = Some(error.clone());
        let delivered = state.broadcast(&ListenerEvent::Location(Err(error.clone())));
        drop(state);

        tracing::warn!(error = %error, delivered, "Location provider failed");
    }

    /// Reverse-geocode a followed fix and publish the address.
    fn follow(&self, location: Location) {
        let registry = self.me.clone();
        self.request(
            RequestKey::Location(location),
            Box::new(move |result| match result {
                Ok(Some(address)) => {
                    if let Some(registry) = registry.upgrade() {
                        registry.publish_address(address);
                    }
                }
                Ok(None) => tracing::debug!("Followed fix has no usable address"),
                Err(e) => tracing::debug!(error = %e, "Followed fix not resolved"),
            }),
        );
    }

    /// Make `address` current and broadcast it, unless it already is.
    fn publish_address(&self, address: Address) {
        self.state.lock().publish_address(&address);
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn current_location(&self) -> Option<Location> {
        self.state.lock().location
    }

    pub fn current_address(&self) -> Option<Address> {
        self.state.lock().address.clone()
    }

    /// Last device provider error, cleared by the next fix.
    pub fn last_error(&self) -> Option<LocationError> {
        self.state.lock().last_error.clone()
    }

    pub fn resolution_state(&self) -> ResolutionState {
        self.state.lock().gate.state()
    }

    /// Number of queued resolution requests.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Registry")
            .field("location", &state.location)
            .field("listeners", &state.listeners.len())
            .field("pending", &state.pending.len())
            .field("resolution", &state.gate.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::geo::{Coordinate, Placemark};
    use crate::provider::StaticGeocoder;
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        let geocoder = StaticGeocoder::new(vec![Placemark {
            locality: Some("Paris".to_string()),
            country: Some("France".to_string()),
            iso_country_code: Some("FR".to_string()),
            thoroughfare: Some("Champ de Mars".to_string()),
            sub_thoroughfare: Some("5".to_string()),
            postal_code: Some("75007".to_string()),
            coordinate: Some(Coordinate::new(48.8584, 2.2945)),
        }]);
        Registry::new(
            ManagerConfig::default().with_min_resolution_interval(Duration::ZERO),
            Arc::new(geocoder),
            Arc::new(MemoryCacheStore::new()),
        )
        .unwrap()
    }

    fn location_channel() -> (
        ListenerKind,
        mpsc::UnboundedReceiver<Result<Location, LocationError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let kind = ListenerKind::location(move |result| {
            let _ = tx.send(result);
        });
        (kind, rx)
    }

    fn address_channel() -> (
        ListenerKind,
        mpsc::UnboundedReceiver<Result<Option<Address>, LocationError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let kind = ListenerKind::address(move |result| {
            let _ = tx.send(result);
        });
        (kind, rx)
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = Registry::new(
            ManagerConfig::default(),
            Arc::new(StaticGeocoder::new(vec![])),
            Arc::new(MemoryCacheStore::new()),
        );
        assert!(matches!(result, Err(SetupError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_location_broadcast_and_suppression() {
        let registry = registry();
        let (kind, mut rx) = location_channel();
        let listener = registry.listen(kind, ListenerOptions::default());

        let fix = Location::new(48.85, 2.29);
        registry.handle_event(LocationEvent::Updated(fix));
        registry.handle_event(LocationEvent::Updated(fix));
        let moved = Location::new(48.86, 2.30);
        registry.handle_event(LocationEvent::Updated(moved));

        assert_eq!(next(&mut rx).await, Ok(fix));
        assert_eq!(next(&mut rx).await, Ok(moved));
        assert_eq!(registry.current_location(), Some(moved));

        listener.unlisten();
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_device_failure_sets_and_clears_last_error() {
        let registry = registry();
        let (kind, mut rx) = location_channel();
        let _listener = registry.listen(kind, ListenerOptions::default());

        let error = LocationError::Location("no signal".to_string());
        registry.handle_event(LocationEvent::Failed(error.clone()));
        assert_eq!(next(&mut rx).await, Err(error.clone()));
        assert_eq!(registry.last_error(), Some(error));

        registry.handle_event(LocationEvent::Updated(Location::new(1.0, 1.0)));
        assert!(next(&mut rx).await.is_ok());
        assert_eq!(registry.last_error(), None);
    }

    #[tokio::test]
    async fn test_address_listener_does_not_receive_locations() {
        let registry = registry();
        let (kind, mut rx) = address_channel();
        let _listener = registry.listen(kind, ListenerOptions::default());

        registry.handle_event(LocationEvent::Updated(Location::new(1.0, 1.0)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unlisten_all() {
        let registry = registry();
        let a = registry.listen(ListenerKind::location(|_| {}), ListenerOptions::default());
        let b = registry.listen(ListenerKind::address(|_| {}), ListenerOptions::default());
        assert_eq!(registry.listener_count(), 2);

        registry.unlisten_all();
        assert_eq!(registry.listener_count(), 0);
        assert!(!a.is_active());
        assert!(!b.is_active());

        a.listen();
        assert!(a.is_active());
        assert_eq!(registry.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_event_loop_applies_sink_events() {
        let registry = registry();
        let (sink, _task) = registry.open_sink();

        let fix = Location::new(10.0, 10.0);
        assert!(sink.update(fix));

        for _ in 0..50 {
            if registry.current_location().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.current_location(), Some(fix));
    }

    #[tokio::test]
    async fn test_follow_address_publishes_resolution() {
        let geocoder = StaticGeocoder::new(vec![Placemark {
            locality: Some("Paris".to_string()),
            country: Some("France".to_string()),
            iso_country_code: Some("FR".to_string()),
            thoroughfare: None,
            sub_thoroughfare: None,
            postal_code: None,
            coordinate: Some(Coordinate::new(48.8584, 2.2945)),
        }]);
        let registry = Registry::new(
            ManagerConfig::default()
                .with_min_resolution_interval(Duration::ZERO)
                .following_address(200.0),
            Arc::new(geocoder),
            Arc::new(MemoryCacheStore::new()),
        )
        .unwrap();

        let (kind, mut rx) = address_channel();
        let _listener = registry.listen(kind, ListenerOptions::default());

        registry.handle_event(LocationEvent::Updated(Location::new(48.8585, 2.2946)));
        let address = next(&mut rx).await.unwrap().unwrap();
        assert_eq!(address.city().name(), "Paris");
        assert_eq!(registry.current_address(), Some(address));

        // A nearby fix is not followed again.
        registry.handle_event(LocationEvent::Updated(Location::new(48.8586, 2.2946)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
