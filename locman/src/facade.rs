//! Process-wide location manager.
//!
//! [`LocationManager`] ties a [`LocationSource`] to a [`Registry`] and adds
//! the convenience entry points applications use: start/stop of continuous
//! updates, one-shot location and address lookups, and subscriptions.
//!
//! One manager can be installed as the shared instance with
//! [`LocationManager::install`] and reached anywhere through
//! [`LocationManager::shared`].
//!
//! # Example
//!
//! ```ignore
//! let manager = LocationManager::install(LocationManager::new(
//!     ManagerConfig::default(),
//!     Arc::new(source),
//!     Arc::new(geocoder),
//!     Arc::new(FileCacheStore::new(cache_path)),
//! )?)?;
//!
//! manager.locate_once(|result| println!("fix: {:?}", result));
//! manager.resolve_address("København, Danmark", |result| println!("{:?}", result));
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::config::ManagerConfig;
use crate::error::{LocationError, PersistenceError, SetupError};
use crate::geo::{Address, City, Location};
use crate::listener::{Listener, ListenerKind, ListenerOptions};
use crate::provider::{Geocoder, LocationSink, LocationSource};
use crate::registry::{Registry, RequestKey};

static SHARED: OnceLock<LocationManager> = OnceLock::new();

/// How the device provider is currently driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// No updates requested.
    #[default]
    Stopped,
    /// Continuous location updates.
    Continuous,
    /// Significant-change monitoring. Recorded only; the provider is not
    /// driven differently.
    SignificantChange,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Stopped => write!(f, "stopped"),
            UpdateMode::Continuous => write!(f, "continuous"),
            UpdateMode::SignificantChange => write!(f, "significant-change"),
        }
    }
}

// =============================================================================
// Update Control
// =============================================================================

#[derive(Debug, Default)]
struct UpdateState {
    mode: UpdateMode,
    /// Stop again after the next fix; set by `locate_once` when it had to
    /// start updates itself.
    stop_after_fix: bool,
}

struct Updates {
    source: Arc<dyn LocationSource>,
    sink: LocationSink,
    state: Mutex<UpdateState>,
}

impl Updates {
    fn start(&self) {
        let mut state = self.state.lock();
        match state.mode {
            UpdateMode::Continuous => return,
            UpdateMode::Stopped | UpdateMode::SignificantChange => {
                self.source.start_updates(self.sink.clone());
            }
        }
        let previous = std::mem::replace(&mut state.mode, UpdateMode::Continuous);
        tracing::info!(previous = %previous, "Location updates started");
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        Self::stop_locked(&self.source, &mut state);
    }

    fn stop_locked(source: &Arc<dyn LocationSource>, state: &mut UpdateState) {
        state.stop_after_fix = false;
        if state.mode == UpdateMode::Stopped {
            return;
        }
        source.stop_updates();
        state.mode = UpdateMode::Stopped;
        tracing::info!("Location updates stopped");
    }

    fn on_fix(&self) {
        let mut state = self.state.lock();
        if state.stop_after_fix {
            tracing::debug!("Single fix delivered, stopping updates");
            Self::stop_locked(&self.source, &mut state);
        }
    }

    fn on_single_fix_timeout(&self) {
        let mut state = self.state.lock();
        if state.stop_after_fix {
            tracing::debug!("Single fix timed out, stopping updates");
            Self::stop_locked(&self.source, &mut state);
        }
    }
}

// =============================================================================
// Location Manager
// =============================================================================

/// Facade over the device provider, the geocoder and the listener registry.
pub struct LocationManager {
    registry: Arc<Registry>,
    updates: Arc<Updates>,
    event_loop: JoinHandle<()>,
    auto_stop: Listener,
}

impl LocationManager {
    /// Create a manager on the current Tokio runtime.
    pub fn new(
        config: ManagerConfig,
        source: Arc<dyn LocationSource>,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, SetupError> {
        let registry = Registry::new(config, geocoder, store)?;
        let (sink, event_loop) = registry.open_sink();

        let updates = Arc::new(Updates {
            source,
            sink,
            state: Mutex::new(UpdateState::default()),
        });

        let watcher = Arc::downgrade(&updates);
        let auto_stop = registry.listen(
            ListenerKind::location(move |_| {
                if let Some(updates) = watcher.upgrade() {
                    updates.on_fix();
                }
            }),
            ListenerOptions::default(),
        );

        Ok(Self {
            registry,
            updates,
            event_loop,
            auto_stop,
        })
    }

    /// Install `manager` as the process-wide instance.
    pub fn install(manager: LocationManager) -> Result<&'static LocationManager, SetupError> {
        SHARED
            .set(manager)
            .map_err(|_| SetupError::AlreadyInstalled)?;
        SHARED.get().ok_or(SetupError::AlreadyInstalled)
    }

    /// The installed process-wide instance, if any.
    pub fn shared() -> Option<&'static LocationManager> {
        SHARED.get()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Start continuous updates. Idempotent.
    pub fn start(&self) {
        self.updates.start();
    }

    /// Stop updates of any kind. Idempotent.
    pub fn stop(&self) {
        self.updates.stop();
    }

    /// Record significant-change monitoring. Has no effect on the provider.
    pub fn start_monitoring_significant_changes(&self) {
        let mut state = self.updates.state.lock();
        if state.mode == UpdateMode::Stopped {
            state.mode = UpdateMode::SignificantChange;
        }
        tracing::info!(mode = %state.mode, "Significant-change monitoring is not supported by this provider");
    }

    pub fn stop_monitoring_significant_changes(&self) {
        let mut state = self.updates.state.lock();
        if state.mode == UpdateMode::SignificantChange {
            state.mode = UpdateMode::Stopped;
        }
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.updates.state.lock().mode
    }

    /// Whether the device provider is permitted and enabled.
    pub fn can_locate(&self) -> bool {
        self.updates.source.is_available()
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn current_location(&self) -> Option<Location> {
        self.registry.current_location()
    }

    pub fn current_address(&self) -> Option<Address> {
        self.registry.current_address()
    }

    pub fn last_error(&self) -> Option<LocationError> {
        self.registry.last_error()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Forward geocode `query`.
    pub fn resolve_address<F>(&self, query: &str, handler: F)
    where
        F: FnOnce(Result<Option<Address>, LocationError>) + Send + 'static,
    {
        self.registry
            .request(RequestKey::Query(query.to_string()), Box::new(handler));
    }

    /// Reverse geocode `location`.
    pub fn resolve_address_at<F>(&self, location: Location, handler: F)
    where
        F: FnOnce(Result<Option<Address>, LocationError>) + Send + 'static,
    {
        self.registry
            .request(RequestKey::Location(location), Box::new(handler));
    }

    /// Resolve a city, reusing the city's own earlier resolution.
    pub fn resolve_city<F>(&self, city: &City, handler: F)
    where
        F: FnOnce(Result<Option<Address>, LocationError>) + Send + 'static,
    {
        if let Some(address) = city.resolved() {
            handler(Ok(Some(address.clone())));
            return;
        }

        let city = city.clone();
        self.registry.request(
            RequestKey::Query(city.query()),
            Box::new(move |result| {
                if let Ok(Some(address)) = &result {
                    city.remember(address.clone());
                }
                handler(result);
            }),
        );
    }

    /// Resolve the address of the current location, waiting for a first
    /// fix if there is none yet.
    pub fn resolve_current_address<F>(&self, handler: F)
    where
        F: FnOnce(Result<Option<Address>, LocationError>) + Send + 'static,
    {
        if let Some(location) = self.current_location() {
            self.resolve_address_at(location, handler);
            return;
        }

        let registry = Arc::downgrade(&self.registry);
        let handler = Mutex::new(Some(handler));
        self.locate_once(move |result| {
            let Some(handler) = handler.lock().take() else {
                return;
            };
            match (result, registry.upgrade()) {
                (Ok(location), Some(registry)) => {
                    registry.request(RequestKey::Location(location), Box::new(handler))
                }
                (Ok(_), None) => handler(Err(LocationError::Cancelled)),
                (Err(e), _) => handler(Err(e)),
            }
        });
    }

    /// Forward geocode `query`, awaiting the result.
    pub async fn resolve_query(&self, query: &str) -> Result<Option<Address>, LocationError> {
        self.registry
            .resolve(RequestKey::Query(query.to_string()))
            .await
    }

    /// Reverse geocode `location`, awaiting the result.
    pub async fn resolve_location(
        &self,
        location: Location,
    ) -> Result<Option<Address>, LocationError> {
        self.registry.resolve(RequestKey::Location(location)).await
    }

    /// Persist the address cache now.
    pub fn save_cache(&self) -> Result<(), PersistenceError> {
        self.registry.save_cache()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Deliver the next fix once, starting updates if needed.
    ///
    /// If updates were stopped they are stopped again after the first fix,
    /// or when the listener times out after the configured listener TTL.
    pub fn locate_once<F>(&self, handler: F) -> Listener
    where
        F: Fn(Result<Location, LocationError>) + Send + Sync + 'static,
    {
        {
            let mut state = self.updates.state.lock();
            if state.mode != UpdateMode::Continuous {
                state.stop_after_fix = true;
            }
        }
        self.updates.start();

        let watcher = Arc::downgrade(&self.updates);
        let handler = move |result: Result<Location, LocationError>| {
            if result.as_ref().is_err_and(LocationError::is_timeout) {
                if let Some(updates) = watcher.upgrade() {
                    updates.on_single_fix_timeout();
                }
            }
            handler(result);
        };

        self.registry.listen(
            ListenerKind::location(handler),
            ListenerOptions::once().with_ttl(self.registry.config().listener_ttl),
        )
    }

    /// Subscribe to location updates.
    pub fn subscribe_location<F>(&self, handler: F, options: ListenerOptions) -> Listener
    where
        F: Fn(Result<Location, LocationError>) + Send + Sync + 'static,
    {
        self.registry.listen(ListenerKind::location(handler), options)
    }

    /// Subscribe to address updates.
    pub fn subscribe_address<F>(&self, handler: F, options: ListenerOptions) -> Listener
    where
        F: Fn(Result<Option<Address>, LocationError>) + Send + Sync + 'static,
    {
        self.registry.listen(ListenerKind::address(handler), options)
    }
}

impl Drop for LocationManager {
    fn drop(&mut self) {
        self.updates.stop();
        self.auto_stop.unlisten();
        self.registry.unlisten_all();
        self.event_loop.abort();
    }
}

impl fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationManager")
            .field("mode", &self.update_mode())
            .field("registry", &self.registry)
            .finish()
    }
}
