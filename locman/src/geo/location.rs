//! Coordinates, device fixes and distance math.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }

    /// Returns true if `other` lies within `precision` metres.
    pub fn is_within(&self, other: &Coordinate, precision: f64) -> bool {
        self.distance_to(other) <= precision
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// A location fix reported by the device provider.
///
/// Two notions of equality apply to fixes:
/// - [`Location::same_position`] is strict: identical coordinates. Used to
///   suppress repeated fixes.
/// - [`Location::is_within`] uses a distance threshold. Used for cache and
///   queue matching, where two nearby fixes mean the same place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Position of the fix.
    pub coordinate: Coordinate,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a fix at the given position, timestamped now.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_timestamp(Coordinate::new(latitude, longitude), Utc::now())
    }

    /// Create a fix with an explicit timestamp.
    pub fn with_timestamp(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            timestamp,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinate.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinate.longitude
    }

    /// Distance to another fix in metres.
    pub fn distance_to(&self, other: &Location) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }

    /// Returns true if `other` lies within `precision` metres.
    pub fn is_within(&self, other: &Location, precision: f64) -> bool {
        self.coordinate.is_within(&other.coordinate, precision)
    }

    /// Returns true if both fixes report exactly the same coordinate.
    pub fn same_position(&self, other: &Location) -> bool {
        self.coordinate == other.coordinate
    }
}

impl From<Coordinate> for Location {
    fn from(coordinate: Coordinate) -> Self {
        Self::with_timestamp(coordinate, Utc::now())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> @ {}", self.coordinate, self.timestamp.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_berlin_paris() {
        let berlin = Coordinate::new(52.5200, 13.4050);
        let paris = Coordinate::new(48.8566, 2.3522);

        let km = berlin.distance_to(&paris) / 1000.0;
        assert!((km - 878.0).abs() < 10.0, "got {} km", km);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let here = Coordinate::new(55.6761, 12.5683);
        assert_eq!(here.distance_to(&here), 0.0);
    }

    #[test]
    fn test_is_within_threshold() {
        // ~111m north
        let a = Location::new(55.6761, 12.5683);
        let b = Location::new(55.6771, 12.5683);

        assert!(a.is_within(&b, 200.0));
        assert!(!a.is_within(&b, 10.0));
    }

    #[test]
    fn test_same_position_ignores_timestamp() {
        let a = Location::new(51.5034, -0.1276);
        let b = Location::with_timestamp(a.coordinate, a.timestamp + chrono::Duration::seconds(5));

        assert!(a.same_position(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_position_is_strict() {
        let a = Location::new(51.5034, -0.1276);
        let b = Location::new(51.503_400_1, -0.1276);

        assert!(!a.same_position(&b));
        assert!(a.is_within(&b, 1.0));
    }
}
