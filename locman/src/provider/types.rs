//! Collaborator contracts: geocoder and device location source.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::LocationError;
use crate::geo::{Location, Placemark};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a geocoding provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    /// The service is disabled, rate limited or not permitted.
    #[error("Geocoder unavailable: {0}")]
    Unavailable(String),

    /// The provider explicitly found nothing.
    #[error("No placemarks found")]
    NotFound,

    /// Any other provider failure.
    #[error("{0}")]
    Failed(String),
}

impl From<GeocodeError> for LocationError {
    fn from(e: GeocodeError) -> Self {
        match e {
            GeocodeError::Unavailable(reason) => LocationError::ProviderUnavailable { reason },
            GeocodeError::NotFound => LocationError::NoResultFound,
            GeocodeError::Failed(message) => LocationError::Geocoding(message),
        }
    }
}

/// Translates between coordinates and placemarks.
///
/// The registry calls at most one of these methods at a time and always uses
/// the first candidate returned.
///
/// # Dyn Compatibility
///
/// Methods return [`BoxFuture`] so geocoders can be shared as
/// `Arc<dyn Geocoder>`.
pub trait Geocoder: Send + Sync + 'static {
    /// Resolve a position to placemark candidates.
    fn reverse_geocode(
        &self,
        location: Location,
    ) -> BoxFuture<'_, Result<Vec<Placemark>, GeocodeError>>;

    /// Resolve a free-form query to placemark candidates.
    fn forward_geocode(&self, query: String)
        -> BoxFuture<'_, Result<Vec<Placemark>, GeocodeError>>;
}

/// An event pushed by the device location provider.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A new fix.
    Updated(Location),
    /// The provider failed to produce a fix.
    Failed(LocationError),
}

/// Push handle given to a [`LocationSource`] when updates start.
///
/// Cheap to clone. Sending never blocks; events are handled on the
/// registry's event loop in the order they were sent.
#[derive(Debug, Clone)]
pub struct LocationSink {
    tx: mpsc::UnboundedSender<LocationEvent>,
}

impl LocationSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<LocationEvent>) -> Self {
        Self { tx }
    }

    /// Report a new fix. Returns false if the registry is gone.
    pub fn update(&self, location: Location) -> bool {
        self.tx.send(LocationEvent::Updated(location)).is_ok()
    }

    /// Report a provider failure. Returns false if the registry is gone.
    pub fn fail(&self, error: LocationError) -> bool {
        self.tx.send(LocationEvent::Failed(error)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Device location provider.
///
/// Implementations push fixes into the [`LocationSink`] they were started
/// with until `stop_updates` is called. Duplicate or late events are
/// tolerated by the registry.
pub trait LocationSource: Send + Sync + 'static {
    /// Whether location services are enabled and permitted.
    fn is_available(&self) -> bool {
        true
    }

    /// Begin pushing fixes into `sink`.
    fn start_updates(&self, sink: LocationSink);

    /// Stop pushing fixes.
    fn stop_updates(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_error_normalization() {
        assert_eq!(
            LocationError::from(GeocodeError::Unavailable("denied".to_string())),
            LocationError::ProviderUnavailable {
                reason: "denied".to_string()
            }
        );
        assert_eq!(
            LocationError::from(GeocodeError::NotFound),
            LocationError::NoResultFound
        );
        assert_eq!(
            LocationError::from(GeocodeError::Failed("HTTP 500".to_string())),
            LocationError::Geocoding("HTTP 500".to_string())
        );
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = LocationSink::new(tx);

        assert!(sink.update(Location::new(1.0, 2.0)));
        drop(rx);
        assert!(!sink.update(Location::new(1.0, 2.0)));
        assert!(sink.is_closed());
    }
}
