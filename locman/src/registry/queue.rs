//! Deferred resolution requests.
//!
//! Requests that cannot be dispatched immediately (a resolution is in flight,
//! or the throttle window has not elapsed) wait here in FIFO order. When a
//! resolution completes, every queued request for the same target is answered
//! from that one result; the oldest remaining request is dispatched next.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

use crate::cache::{normalize_query, CacheKey};
use crate::geo::{Coordinate, Location};
use crate::listener::AddressCallback;

// =============================================================================
// Request Key
// =============================================================================

/// What an address resolution is for.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKey {
    /// A free-form query, forward geocoded.
    Query(String),
    /// A position, reverse geocoded.
    Location(Location),
}

impl RequestKey {
    /// The cache entry this request reads and writes.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            RequestKey::Query(query) => CacheKey::query(query),
            RequestKey::Location(location) => CacheKey::location(location),
        }
    }

    /// Whether a request for `self` is answered by a completed request for
    /// `completed` that resolved to `resolved`.
    ///
    /// Queries match on the normalized string. Positions match within
    /// `precision` metres of the completed position or of the resolved one.
    pub fn is_answered_by(
        &self,
        completed: &RequestKey,
        resolved: Option<&Coordinate>,
        precision: f64,
    ) -> bool {
        match (self, completed) {
            (RequestKey::Query(a), RequestKey::Query(b))
                if normalize_query(a) == normalize_query(b) =>
            {
                true
            }
            (RequestKey::Location(a), RequestKey::Location(b)) if a.is_within(b, precision) => {
                true
            }
            (RequestKey::Location(a), _) => {
                resolved.is_some_and(|coordinate| a.coordinate.is_within(coordinate, precision))
            }
            (RequestKey::Query(_), _) => false,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKey::Query(query) => write!(f, "query '{}'", query),
            RequestKey::Location(location) => write!(f, "location {}", location.coordinate),
        }
    }
}

// =============================================================================
// Pending Request
// =============================================================================

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A resolution request and the callback waiting on it.
pub(crate) struct PendingRequest {
    pub key: RequestKey,
    pub callback: AddressCallback,
    pub sequence: u64,
    pub enqueued_at: Instant,
}

impl PendingRequest {
    pub fn new(key: RequestKey, callback: AddressCallback) -> Self {
        Self {
            key,
            callback,
            sequence: REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("key", &self.key)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Queue
// =============================================================================

/// FIFO of requests waiting for the resolution gate.
#[derive(Debug, Default)]
pub(crate) struct PendingRequestQueue {
    requests: VecDeque<PendingRequest>,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn push(&mut self, request: PendingRequest) {
        self.requests.push_back(request);
    }

    /// The oldest request, without removing it.
    pub fn peek(&self) -> Option<&PendingRequest> {
        self.requests.front()
    }

    /// Remove every request answered by the completed `key`, in queue order.
    pub fn pop_matching(
        &mut self,
        key: &RequestKey,
        resolved: Option<&Coordinate>,
        precision: f64,
    ) -> Vec<PendingRequest> {
        let (matched, rest): (VecDeque<_>, VecDeque<_>) = self
            .requests
            .drain(..)
            .partition(|request| request.key.is_answered_by(key, resolved, precision));
        self.requests = rest;
        matched.into()
    }

    /// Remove the oldest request.
    pub fn pop_next(&mut self) -> Option<PendingRequest> {
        self.requests.pop_front()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
