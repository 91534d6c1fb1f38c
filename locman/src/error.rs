//! Error types shared across the location manager.
//!
//! [`LocationError`] is the only error a subscriber or resolution handler ever
//! sees. It is `Clone` because one provider failure is fanned out to every
//! caller waiting on the same key.
//!
//! Persistence failures ([`PersistenceError`]) are reported by cache stores but
//! never reach handlers: the registry logs and swallows them.

use std::time::Duration;

use thiserror::Error;

/// Errors delivered to location and address handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Location or geocoding services are disabled or not permitted.
    #[error("Location services unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// The geocoder returned no usable candidates.
    #[error("No result found")]
    NoResultFound,

    /// A listener received no update within its time-to-live.
    #[error("No update received within {}ms", ttl.as_millis())]
    Timeout { ttl: Duration },

    /// The geocoding provider failed; message passed through verbatim.
    #[error("Geocoding failed: {0}")]
    Geocoding(String),

    /// The device location provider reported a failure.
    #[error("Location update failed: {0}")]
    Location(String),

    /// The request was dropped before a result was produced.
    #[error("Request cancelled before completion")]
    Cancelled,
}

impl LocationError {
    /// Returns true for listener time-to-live expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LocationError::Timeout { .. })
    }
}

/// Errors raised while saving or loading the address cache.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error on the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be encoded.
    #[error("Failed to encode address cache: {0}")]
    Encode(String),

    /// The stored snapshot could not be decoded.
    #[error("Failed to decode address cache: {0}")]
    Decode(String),
}

/// Errors raised while constructing a manager.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Construction happened outside a Tokio runtime.
    #[error("A Tokio runtime is required to create a location manager")]
    NoRuntime,

    /// The shared manager has already been installed.
    #[error("The shared location manager is already installed")]
    AlreadyInstalled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_error_display() {
        let err = LocationError::ProviderUnavailable {
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("permission denied"));

        let err = LocationError::Timeout {
            ttl: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "No update received within 1500ms");
    }

    #[test]
    fn test_is_timeout() {
        assert!(LocationError::Timeout {
            ttl: Duration::from_secs(1)
        }
        .is_timeout());
        assert!(!LocationError::NoResultFound.is_timeout());
    }

    #[test]
    fn test_persistence_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PersistenceError = io_err.into();
        assert!(matches!(err, PersistenceError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }
}
