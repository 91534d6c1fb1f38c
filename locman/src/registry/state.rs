//! State guarded by the registry lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::queue::PendingRequestQueue;
use crate::cache::AddressCache;
use crate::error::LocationError;
use crate::geo::{Address, Location};
use crate::listener::{ListenerEvent, ListenerId, ListenerShared};

// =============================================================================
// Resolution Gate
// =============================================================================

/// Address resolution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// No geocoding call outstanding.
    Idle,
    /// One geocoding call outstanding.
    Resolving,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionState::Idle => write!(f, "idle"),
            ResolutionState::Resolving => write!(f, "resolving"),
        }
    }
}

/// In-flight exclusion plus minimum-interval throttle.
#[derive(Debug, Default)]
pub(crate) struct ResolutionGate {
    in_flight: bool,
    last_started: Option<Instant>,
    drain_scheduled: bool,
}

impl ResolutionGate {
    pub fn state(&self) -> ResolutionState {
        if self.in_flight {
            ResolutionState::Resolving
        } else {
            ResolutionState::Idle
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Time left before the next call may start, or `None` if it may start now.
    pub fn throttle_remaining(&self, interval: Duration, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_started?);
        (elapsed < interval).then(|| interval - elapsed)
    }

    pub fn acquire(&mut self, now: Instant) {
        debug_assert!(!self.in_flight, "resolution gate acquired twice");
        self.in_flight = true;
        self.last_started = Some(now);
    }

    pub fn release(&mut self) {
        self.in_flight = false;
    }

    /// Claim the single drain wake-up. Returns false if one is already pending.
    pub fn schedule_drain(&mut self) -> bool {
        !std::mem::replace(&mut self.drain_scheduled, true)
    }

    pub fn drain_fired(&mut self) {
        self.drain_scheduled = false;
    }
}

// =============================================================================
// Registry State
// =============================================================================

/// Everything the registry mutates, behind one lock.
pub(crate) struct RegistryState {
    pub location: Option<Location>,
    pub address: Option<Address>,
    pub last_error: Option<LocationError>,
    pub gate: ResolutionGate,
    pub listeners: BTreeMap<ListenerId, Arc<ListenerShared>>,
    pub pending: PendingRequestQueue,
    pub cache: AddressCache,
    /// Last fix that triggered an address-following resolution.
    pub followed: Option<Location>,
    /// Bumped on every cache write; orders persisted snapshots.
    pub cache_generation: u64,
}

impl RegistryState {
    pub fn new(cache: AddressCache) -> Self {
        Self {
            location: None,
            address: None,
            last_error: None,
            gate: ResolutionGate::default(),
            listeners: BTreeMap::new(),
            pending: PendingRequestQueue::new(),
            cache,
            followed: None,
            cache_generation: 0,
        }
    }

    /// Make `address` current and broadcast it. Returns false, without
    /// broadcasting, if it already is current.
    pub fn publish_address(&mut self, address: &Address) -> bool {
        if self.address.as_ref() == Some(address) {
            return false;
        }
        self.address = Some(address.clone());
        self.broadcast(&ListenerEvent::Address(Ok(Some(address.clone()))));
        true
    }

    /// Queue `event` on every listener of the matching kind, in id order.
    ///
    /// Listeners that retire on delivery are removed.
    pub fn broadcast(&mut self, event: &ListenerEvent) -> usize {
        let mut delivered = 0;
        self.listeners.retain(|_, listener| {
            if !listener.kind().accepts(event) {
                return true;
            }
            delivered += 1;
            listener.emit(event.clone())
        });
        delivered
    }
}
