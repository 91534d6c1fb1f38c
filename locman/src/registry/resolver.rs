//! Address resolution: cache lookup, gate, geocoder dispatch and drain.

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::queue::{PendingRequest, RequestKey};
use super::state::RegistryState;
use super::Registry;
use crate::cache::{CacheKey, CacheSnapshot};
use crate::config::ThrottlePolicy;
use crate::error::{LocationError, PersistenceError};
use crate::geo::{Address, Placemark};
use crate::listener::{AddressCallback, ListenerEvent};
use crate::provider::GeocodeError;

/// Callbacks answered from the cache while advancing the queue.
type CachedAnswers = Vec<(AddressCallback, Address)>;

impl Registry {
    /// Resolve `key` to an address and hand the result to `callback`.
    ///
    /// A cache hit is answered inline on the calling thread. Otherwise the
    /// callback runs on the runtime once the geocoder has answered, which may
    /// be after earlier queued requests have been served.
    ///
    /// `Ok(None)` means the best candidate lacked a country or ISO code, or
    /// the request was throttled under [`ThrottlePolicy::FastFail`]. Fast
    /// failing only applies while nothing is in flight or queued.
    pub fn request(&self, key: RequestKey, callback: AddressCallback) {
        let mut state = self.state.lock();

        if let Some(address) = state.cache.get(&key.cache_key()) {
            drop(state);
            tracing::debug!(key = %key, "Address cache hit");
            callback(Ok(Some(address)));
            return;
        }

        if !state.gate.is_in_flight()
            && state.pending.is_empty()
            && self.config.throttle_policy == ThrottlePolicy::FastFail
            && state
                .gate
                .throttle_remaining(self.config.min_resolution_interval, Instant::now())
                .is_some()
        {
            drop(state);
            tracing::debug!(key = %key, "Resolution throttled, answering empty");
            callback(Ok(None));
            return;
        }

        tracing::debug!(
            key = %key,
            state = %state.gate.state(),
            queued = state.pending.len(),
            "Address cache miss"
        );
        state.pending.push(PendingRequest::new(key, callback));

        let mut answered = CachedAnswers::new();
        let next = self.advance(&mut state, &mut answered);
        drop(state);

        self.finish(answered, next);
    }

    /// Resolve `key`, awaiting the result.
    pub async fn resolve(&self, key: RequestKey) -> Result<Option<Address>, LocationError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            key,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap_or(Err(LocationError::Cancelled))
    }

    /// Persist the cache, returning any store error to the caller.
    pub fn save_cache(&self) -> Result<(), PersistenceError> {
        let (generation, snapshot) = {
            let state = self.state.lock();
            (state.cache_generation, state.cache.snapshot())
        };
        self.write_snapshot(generation, &snapshot)
    }

    // =========================================================================
    // State Machine
    // =========================================================================

    /// Take the next request to dispatch, if the gate and throttle allow.
    ///
    /// Queued requests that the cache can now answer are moved to `answered`
    /// without touching the gate. If the throttle window is still open a
    /// single wake-up is scheduled.
    fn advance(
        &self,
        state: &mut RegistryState,
        answered: &mut CachedAnswers,
    ) -> Option<PendingRequest> {
        loop {
            if state.gate.is_in_flight() {
                return None;
            }

            let cached = state
                .pending
                .peek()
                .and_then(|request| state.cache.get(&request.key.cache_key()));
            if let Some(address) = cached {
                let request = state.pending.pop_next()?;
                answered.push((request.callback, address));
                continue;
            }

            if state.pending.is_empty() {
                return None;
            }

            let now = Instant::now();
            if let Some(remaining) = state
                .gate
                .throttle_remaining(self.config.min_resolution_interval, now)
            {
                self.schedule_drain(state, remaining);
                return None;
            }

            let request = state.pending.pop_next()?;
            state.gate.acquire(now);
            tracing::debug!(
                key = %request.key,
                waited_ms = now.saturating_duration_since(request.enqueued_at).as_millis() as u64,
                "Resolution gate acquired"
            );
            return Some(request);
        }
    }

    /// Answer cached requests and dispatch `next`, outside the lock.
    fn finish(&self, answered: CachedAnswers, next: Option<PendingRequest>) {
        for (callback, address) in answered {
            callback(Ok(Some(address)));
        }
        if let Some(request) = next {
            self.dispatch(request);
        }
    }

    /// Run the geocoder for `request` on the runtime.
    fn dispatch(&self, request: PendingRequest) {
        let Some(registry) = self.me.upgrade() else {
            (request.callback)(Err(LocationError::Cancelled));
            return;
        };
        let geocoder = std::sync::Arc::clone(&self.geocoder);

        self.runtime.spawn(async move {
            let result = match &request.key {
                RequestKey::Query(query) => geocoder.forward_geocode(query.clone()).await,
                RequestKey::Location(location) => geocoder.reverse_geocode(*location).await,
            };
            registry.complete(request, normalize(result));
        });
    }

    /// Apply a geocoder result: release the gate, cache on success, broadcast
    /// the outcome to address listeners, answer the caller and every matching
    /// waiter, then move on to the next queued request.
    ///
    /// A successful result equal to the current address is not broadcast
    /// again.
    fn complete(&self, request: PendingRequest, result: Result<Option<Address>, LocationError>) {
        let precision = self.config.cache_precision_meters;
        let resolved = result.as_ref().ok().and_then(Option::as_ref).cloned();

        let mut state = self.state.lock();
        state.gate.release();

        let waiters = state.pending.pop_matching(
            &request.key,
            resolved.as_ref().map(Address::coordinate).as_ref(),
            precision,
        );

        let snapshot = match &result {
            Ok(Some(address)) => {
                state.cache.set(request.key.cache_key(), address.clone());
                state
                    .cache
                    .set(CacheKey::Coordinate(address.coordinate()), address.clone());
                state.cache_generation += 1;
                state.publish_address(address);
                Some((state.cache_generation, state.cache.snapshot()))
            }
            Ok(None) | Err(_) => {
                state.broadcast(&ListenerEvent::Address(result.clone()));
                None
            }
        };

        let mut answered = CachedAnswers::new();
        let next = self.advance(&mut state, &mut answered);
        drop(state);

        match &result {
            Ok(Some(address)) => tracing::debug!(
                key = %request.key,
                address = %address,
                waiters = waiters.len(),
                "Resolution completed"
            ),
            Ok(None) => tracing::debug!(key = %request.key, "Resolution found no usable address"),
            Err(e) => tracing::debug!(
                key = %request.key,
                error = %e,
                waiters = waiters.len(),
                "Resolution failed"
            ),
        }

        if let Some((generation, snapshot)) = snapshot {
            self.persist(generation, &snapshot);
        }

        (request.callback)(result.clone());
        for waiter in waiters {
            (waiter.callback)(result.clone());
        }

        self.finish(answered, next);
    }

    /// Wake up after `delay` to drain the queue. At most one wake-up is
    /// pending at a time.
    fn schedule_drain(&self, state: &mut RegistryState, delay: std::time::Duration) {
        if !state.gate.schedule_drain() {
            return;
        }
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            queued = state.pending.len(),
            "Resolution throttled, drain scheduled"
        );

        let registry = self.me.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = registry.upgrade() {
                registry.drain();
            }
        });
    }

    fn drain(&self) {
        let mut state = self.state.lock();
        state.gate.drain_fired();
        let mut answered = CachedAnswers::new();
        let next = self.advance(&mut state, &mut answered);
        drop(state);

        self.finish(answered, next);
    }

    fn persist(&self, generation: u64, snapshot: &CacheSnapshot) {
        if let Err(e) = self.write_snapshot(generation, snapshot) {
            tracing::warn!(error = %e, "Failed to save address cache");
        }
    }

    /// Save `snapshot` unless a newer one has already been written.
    ///
    /// Saves are serialized, so completions racing an explicit save cannot
    /// leave an older snapshot on disk.
    fn write_snapshot(
        &self,
        generation: u64,
        snapshot: &CacheSnapshot,
    ) -> Result<(), PersistenceError> {
        let mut persisted = self.persisted.lock();
        if generation < *persisted {
            tracing::debug!(generation, persisted = *persisted, "Skipping stale cache snapshot");
            return Ok(());
        }
        self.store.save(snapshot)?;
        *persisted = generation;
        Ok(())
    }
}

/// Reduce geocoder output to the first candidate.
///
/// An empty list is [`LocationError::NoResultFound`]; a candidate without a
/// country or ISO code is `Ok(None)`.
fn normalize(result: Result<Vec<Placemark>, GeocodeError>) -> Result<Option<Address>, LocationError> {
    let placemarks = result?;
    let first = placemarks.first().ok_or(LocationError::NoResultFound)?;
    Ok(Address::from_placemark(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::MemoryCacheStore;
    use crate::config::ManagerConfig;
    use crate::geo::Coordinate;
    use crate::provider::StaticGeocoder;
    use crate::registry::ResolutionState;

    fn placemark(locality: &str, iso: &str, lat: f64, lon: f64) -> Placemark {
        Placemark {
            locality: Some(locality.to_string()),
            country: Some(format!("{} country", iso)),
            iso_country_code: Some(iso.to_string()),
            thoroughfare: None,
            sub_thoroughfare: None,
            postal_code: None,
            coordinate: Some(Coordinate::new(lat, lon)),
        }
    }

    fn setup(config: ManagerConfig, delay: Duration) -> (Arc<Registry>, Arc<StaticGeocoder>) {
        let geocoder = Arc::new(
            StaticGeocoder::new(vec![
                placemark("Paris", "FR", 48.8566, 2.3522),
                placemark("Rome", "IT", 41.9028, 12.4964),
            ])
            .with_delay(delay),
        );
        let registry = Registry::new(
            config,
            Arc::clone(&geocoder) as Arc<dyn crate::provider::Geocoder>,
            Arc::new(MemoryCacheStore::new()),
        )
        .unwrap();
        (registry, geocoder)
    }

    fn unthrottled() -> ManagerConfig {
        ManagerConfig::default().with_min_resolution_interval(Duration::ZERO)
    }

    async fn next_event<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_normalize_results() {
        assert_eq!(normalize(Ok(vec![])), Err(LocationError::NoResultFound));
        assert_eq!(
            normalize(Err(GeocodeError::Failed("boom".to_string()))),
            Err(LocationError::Geocoding("boom".to_string()))
        );

        let mut incomplete = placemark("Nowhere", "XX", 0.0, 0.0);
        incomplete.iso_country_code = None;
        assert_eq!(normalize(Ok(vec![incomplete])), Ok(None));

        let address = normalize(Ok(vec![placemark("Rome", "IT", 41.9, 12.5)]))
            .unwrap()
            .unwrap();
        assert_eq!(address.country().iso(), "IT");
    }

    #[tokio::test]
    async fn test_resolve_then_cache_hit() {
        let (registry, geocoder) = setup(unthrottled(), Duration::ZERO);

        let first = registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await
            .unwrap()
            .unwrap();
        let second = registry
            .resolve(RequestKey::Query("  paris ".to_string()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(geocoder.call_count(), 1);
        assert_eq!(registry.current_address(), Some(first.clone()));

        // The resolved coordinate is cached too.
        let nearby = registry
            .resolve(RequestKey::Location(crate::geo::Location::new(48.8567, 2.3523)))
            .await
            .unwrap();
        assert_eq!(nearby, Some(first));
        assert_eq!(geocoder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (registry, geocoder) = setup(unthrottled(), Duration::ZERO);
        geocoder.set_failure(Some(GeocodeError::Unavailable("offline".to_string())));

        let result = registry.resolve(RequestKey::Query("Rome".to_string())).await;
        assert_eq!(
            result,
            Err(LocationError::ProviderUnavailable {
                reason: "offline".to_string()
            })
        );
        assert_eq!(registry.cache_len(), 0);
        assert_eq!(registry.resolution_state(), ResolutionState::Idle);

        geocoder.set_failure(None);
        assert!(registry
            .resolve(RequestKey::Query("Rome".to_string()))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_fast_fail_inside_throttle_window() {
        let config = ManagerConfig::default()
            .with_min_resolution_interval(Duration::from_secs(60))
            .with_throttle_policy(ThrottlePolicy::FastFail);
        let (registry, geocoder) = setup(config, Duration::ZERO);

        assert!(registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            registry.resolve(RequestKey::Query("Rome".to_string())).await,
            Ok(None)
        );
        assert_eq!(geocoder.call_count(), 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fast_fail_does_not_overtake_queued_requests() {
        let config = ManagerConfig::default()
            .with_min_resolution_interval(Duration::from_millis(300))
            .with_throttle_policy(ThrottlePolicy::FastFail);
        let (registry, geocoder) = setup(config, Duration::from_millis(100));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for city in ["Paris", "Rome"] {
            let tx = tx.clone();
            registry.request(
                RequestKey::Query(city.to_string()),
                Box::new(move |result: Result<Option<Address>, LocationError>| {
                    let _ = tx.send((city, result));
                }),
            );
        }

        // Paris has completed; Rome waits for the throttle window.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.resolution_state(), ResolutionState::Idle);
        assert_eq!(registry.pending_count(), 1);

        let late = tokio::time::timeout(
            Duration::from_secs(3),
            registry.resolve(RequestKey::Query("Atlantis".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(late, Err(LocationError::NoResultFound));

        let (first, paris) = rx.recv().await.unwrap();
        let (second, rome) = rx.recv().await.unwrap();
        assert_eq!((first, second), ("Paris", "Rome"));
        assert!(paris.unwrap().is_some());
        assert!(rome.unwrap().is_some());
        assert_eq!(geocoder.call_count(), 3);
    }

    #[tokio::test]
    async fn test_address_listeners_see_every_outcome() {
        let mut incomplete = placemark("Nowhere", "XX", 10.0, 10.0);
        incomplete.iso_country_code = None;
        let geocoder = Arc::new(StaticGeocoder::new(vec![
            placemark("Paris", "FR", 48.8566, 2.3522),
            incomplete,
        ]));
        let registry = Registry::new(
            unthrottled(),
            Arc::clone(&geocoder) as Arc<dyn crate::provider::Geocoder>,
            Arc::new(MemoryCacheStore::new()),
        )
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = registry.listen(
            crate::listener::ListenerKind::address(
                move |result: Result<Option<Address>, LocationError>| {
                    let _ = tx.send(result);
                },
            ),
            crate::listener::ListenerOptions::default(),
        );
        let paris = registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await
            .unwrap();
        assert_eq!(next_event(&mut rx).await, Ok(paris));

        assert_eq!(
            registry.resolve(RequestKey::Query("Nowhere".to_string())).await,
            Ok(None)
        );
        assert_eq!(next_event(&mut rx).await, Ok(None));

        geocoder.set_failure(Some(GeocodeError::Failed("boom".to_string())));
        let failed = registry.resolve(RequestKey::Query("Rome".to_string())).await;
        assert_eq!(failed, Err(LocationError::Geocoding("boom".to_string())));
        assert_eq!(next_event(&mut rx).await, failed);

        // Neither outcome replaced the current address.
        assert_eq!(registry.current_address().unwrap().city().name(), "Paris");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        listener.unlisten();
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_not_written() {
        let geocoder = Arc::new(StaticGeocoder::new(vec![placemark(
            "Paris", "FR", 48.8566, 2.3522,
        )]));
        let store = Arc::new(MemoryCacheStore::new());
        let registry = Registry::new(
            unthrottled(),
            geocoder,
            Arc::clone(&store) as Arc<dyn crate::cache::CacheStore>,
        )
        .unwrap();

        registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await
            .unwrap();
        assert_eq!(store.save_count(), 1);

        let stale = CacheSnapshot::new(Vec::new());
        registry.write_snapshot(0, &stale).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().unwrap().entries.len(), 2);

        // An explicit save of the current generation is still written.
        registry.save_cache().unwrap();
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_queue_policy_defers_until_window_elapses() {
        let config = ManagerConfig::default()
            .with_min_resolution_interval(Duration::from_millis(150))
            .with_throttle_policy(ThrottlePolicy::Queue);
        let (registry, geocoder) = setup(config, Duration::ZERO);

        registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await
            .unwrap();

        let started = Instant::now();
        let rome = registry.resolve(RequestKey::Query("Rome".to_string()));
        let rome = tokio::time::timeout(Duration::from_secs(2), rome)
            .await
            .unwrap()
            .unwrap();

        assert!(rome.is_some());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(geocoder.call_count(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let geocoder = Arc::new(StaticGeocoder::new(vec![placemark(
            "Paris", "FR", 48.8566, 2.3522,
        )]));
        let registry = Registry::new(
            unthrottled(),
            geocoder,
            Arc::new(MemoryCacheStore::failing()),
        )
        .unwrap();

        let result = registry
            .resolve(RequestKey::Query("Paris".to_string()))
            .await;
        assert!(matches!(result, Ok(Some(_))));
        assert!(registry.save_cache().is_err());
    }
}
