//! In-memory gazetteer geocoder.
//!
//! Resolves against a fixed list of placemarks, which makes it suitable for
//! offline use, demos and tests. It records every call so callers can check
//! how often, in what order, and how concurrently it was used.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::types::{BoxFuture, GeocodeError, Geocoder};
use crate::cache::normalize_query;
use crate::geo::{Location, Placemark};

/// Default maximum distance for reverse matches, in metres.
pub const DEFAULT_REVERSE_RANGE_METERS: f64 = 1_000.0;

/// A geocoder call as recorded by [`StaticGeocoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeCall {
    Forward(String),
    Reverse(Location),
}

/// Geocoder backed by a fixed gazetteer.
///
/// - Forward: every comma-separated part of the query must appear in the
///   placemark label (case-insensitive). All matches are returned in
///   gazetteer order.
/// - Reverse: the nearest placemark within the reverse range.
#[derive(Debug)]
pub struct StaticGeocoder {
    placemarks: Vec<Placemark>,
    reverse_range_meters: f64,
    delay: Duration,
    failure: Mutex<Option<GeocodeError>>,
    calls: Mutex<Vec<GeocodeCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new(placemarks: Vec<Placemark>) -> Self {
        Self {
            placemarks,
            reverse_range_meters: DEFAULT_REVERSE_RANGE_METERS,
            delay: Duration::ZERO,
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Load a gazetteer from a JSON array of placemarks.
    pub fn from_json_file(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let placemarks: Vec<Placemark> = serde_json::from_str(&content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to parse gazetteer {}: {}", path.display(), e),
            )
        })?;

        tracing::debug!(
            path = %path.display(),
            placemarks = placemarks.len(),
            "Loaded gazetteer"
        );

        Ok(Self::new(placemarks))
    }

    /// Simulate provider latency on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the maximum distance for reverse matches.
    pub fn with_reverse_range(mut self, meters: f64) -> Self {
        self.reverse_range_meters = meters;
        self
    }

    /// Make subsequent calls fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, error: Option<GeocodeError>) {
        *self.failure.lock() = error;
    }

    /// Every call made so far, in dispatch order.
    pub fn calls(&self) -> Vec<GeocodeCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of calls that were ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn forward_matches(&self, query: &str) -> Vec<Placemark> {
        let parts: Vec<String> = query
            .split(',')
            .map(normalize_query)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            return Vec::new();
        }

        self.placemarks
            .iter()
            .filter(|placemark| {
                let label = normalize_query(&placemark.label());
                parts.iter().all(|part| label.contains(part.as_str()))
            })
            .cloned()
            .collect()
    }

    fn reverse_match(&self, location: &Location) -> Vec<Placemark> {
        self.placemarks
            .iter()
            .filter_map(|placemark| {
                let distance = placemark.coordinate?.distance_to(&location.coordinate);
                (distance <= self.reverse_range_meters).then_some((distance, placemark))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, placemark)| vec![placemark.clone()])
            .unwrap_or_default()
    }

    async fn run<F>(&self, call: GeocodeCall, lookup: F) -> Result<Vec<Placemark>, GeocodeError>
    where
        F: FnOnce(&Self) -> Vec<Placemark>,
    {
        self.calls.lock().push(call);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.failure.lock().clone();
        let result = match failure {
            Some(error) => Err(error),
            None => Ok(lookup(self)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Geocoder for StaticGeocoder {
    fn reverse_geocode(
        &self,
        location: Location,
    ) -> BoxFuture<'_, Result<Vec<Placemark>, GeocodeError>> {
        Box::pin(self.run(GeocodeCall::Reverse(location), move |geocoder| {
            geocoder.reverse_match(&location)
        }))
    }

    fn forward_geocode(
        &self,
        query: String,
    ) -> BoxFuture<'_, Result<Vec<Placemark>, GeocodeError>> {
        Box::pin(async move {
            let call = GeocodeCall::Forward(query.clone());
            self.run(call, |geocoder| geocoder.forward_matches(&query))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn gazetteer() -> Vec<Placemark> {
        vec![
            Placemark {
                locality: Some("København".to_string()),
                country: Some("Danmark".to_string()),
                iso_country_code: Some("DK".to_string()),
                thoroughfare: Some("Rådhuspladsen".to_string()),
                sub_thoroughfare: Some("1".to_string()),
                postal_code: Some("1550".to_string()),
                coordinate: Some(Coordinate::new(55.6761, 12.5683)),
            },
            Placemark {
                locality: Some("London".to_string()),
                country: Some("United Kingdom".to_string()),
                iso_country_code: Some("GB".to_string()),
                thoroughfare: Some("Downing Street".to_string()),
                sub_thoroughfare: Some("10".to_string()),
                postal_code: Some("SW1A 2AA".to_string()),
                coordinate: Some(Coordinate::new(51.5034, -0.1276)),
            },
        ]
    }

    #[tokio::test]
    async fn test_forward_matches_all_parts() {
        let geocoder = StaticGeocoder::new(gazetteer());

        let result = geocoder
            .forward_geocode("københavn, danmark".to_string())
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].iso_country_code.as_deref(), Some("DK"));

        let result = geocoder
            .forward_geocode("København, Sverige".to_string())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_reverse_returns_nearest_in_range() {
        let geocoder = StaticGeocoder::new(gazetteer());

        let result = geocoder
            .reverse_geocode(Location::new(51.5040, -0.1280))
            .await
            .unwrap();
        assert_eq!(result[0].locality.as_deref(), Some("London"));

        let result = geocoder
            .reverse_geocode(Location::new(0.0, 0.0))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_call_log() {
        let geocoder = StaticGeocoder::new(gazetteer());
        geocoder.set_failure(Some(GeocodeError::Unavailable("offline".to_string())));

        let result = geocoder.forward_geocode("London".to_string()).await;
        assert_eq!(
            result,
            Err(GeocodeError::Unavailable("offline".to_string()))
        );

        geocoder.set_failure(None);
        assert!(geocoder
            .forward_geocode("London".to_string())
            .await
            .is_ok());

        assert_eq!(
            geocoder.calls(),
            vec![
                GeocodeCall::Forward("London".to_string()),
                GeocodeCall::Forward("London".to_string())
            ]
        );
        assert_eq!(geocoder.max_in_flight(), 1);
    }

    #[test]
    fn test_from_json_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("gazetteer.json");
        std::fs::write(&path, serde_json::to_string(&gazetteer()).unwrap()).unwrap();

        let geocoder = StaticGeocoder::from_json_file(&path).unwrap();
        assert_eq!(geocoder.placemarks.len(), 2);

        std::fs::write(&path, "{ not json").unwrap();
        let err = StaticGeocoder::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
