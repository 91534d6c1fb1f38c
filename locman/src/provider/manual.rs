//! Push-driven location source.
//!
//! Fixes are fed in by the owner with [`ManualLocationSource::push`]. Used by
//! the demo to replay recorded tracks, and by tests to script device events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::types::{LocationSink, LocationSource};
use crate::error::LocationError;
use crate::geo::Location;

/// A [`LocationSource`] driven by explicit calls.
#[derive(Debug)]
pub struct ManualLocationSource {
    sink: Mutex<Option<LocationSink>>,
    available: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl Default for ManualLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualLocationSource {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            available: AtomicBool::new(true),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Toggle what `is_available` reports.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Push a fix. Dropped (returns false) while updates are stopped.
    pub fn push(&self, location: Location) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.update(location),
            None => false,
        }
    }

    /// Push a failure. Dropped (returns false) while updates are stopped.
    pub fn fail(&self, error: LocationError) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.fail(error),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }
}

impl LocationSource for ManualLocationSource {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn start_updates(&self, sink: LocationSink) {
        self.starts.fetch_add(1, Ordering::Relaxed);
        *self.sink.lock() = Some(sink);
    }

    fn stop_updates(&self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.sink.lock().take();
    }
}
