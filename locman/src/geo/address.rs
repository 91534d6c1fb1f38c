//! Resolved place data: countries, cities and addresses.
//!
//! Addresses are immutable once built and persist through a flat
//! [`AddressRecord`] so the stored form stays independent of the in-memory
//! layout.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::location::{Coordinate, Location};
use super::placemark::Placemark;

/// A country. Two countries are equal when their ISO codes match.
#[derive(Debug, Clone)]
pub struct Country {
    iso: String,
    name: String,
}

impl Country {
    pub fn new(iso: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            iso: iso.into(),
            name: name.into(),
        }
    }

    pub fn iso(&self) -> &str {
        &self.iso
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Country {
    fn eq(&self, other: &Self) -> bool {
        self.iso == other.iso
    }
}

impl Eq for Country {}

impl Hash for Country {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iso.hash(state);
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.iso)
    }
}

/// A city within a country.
///
/// Equality is by `(name, country)`. A city can be resolved to an address
/// once; the first successful resolution is remembered and shared by every
/// clone of the city.
#[derive(Debug, Clone)]
pub struct City {
    name: String,
    country: Country,
    resolved: Arc<OnceLock<Address>>,
}

impl City {
    pub fn new(name: impl Into<String>, country: Country) -> Self {
        Self {
            name: name.into(),
            country,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn country(&self) -> &Country {
        &self.country
    }

    /// Free-form query used to resolve this city.
    pub fn query(&self) -> String {
        format!("{}, {}", self.name, self.country.name)
    }

    /// The address this city resolved to, if it has been resolved.
    pub fn resolved(&self) -> Option<&Address> {
        self.resolved.get()
    }

    /// Remember a resolution. Only the first call has an effect.
    pub(crate) fn remember(&self, address: Address) {
        let _ = self.resolved.set(address);
    }
}

impl PartialEq for City {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.country == other.country
    }
}

impl Eq for City {}

impl Hash for City {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.country.hash(state);
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.name, self.country)
    }
}

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AddressRecord", into = "AddressRecord")]
pub struct Address {
    city: City,
    street: String,
    zip_code: String,
    coordinate: Coordinate,
}

impl Address {
    pub fn new(
        city: City,
        street: impl Into<String>,
        zip_code: impl Into<String>,
        coordinate: Coordinate,
    ) -> Self {
        Self {
            city,
            street: street.into(),
            zip_code: zip_code.into(),
            coordinate,
        }
    }

    /// Build an address from a geocoder candidate.
    ///
    /// Returns `None` when the candidate lacks a country name, an ISO code or
    /// a coordinate. Missing street, city or postal code become empty strings.
    pub fn from_placemark(placemark: &Placemark) -> Option<Self> {
        let country = Country::new(
            placemark.iso_country_code.clone()?,
            placemark.country.clone()?,
        );
        let coordinate = placemark.coordinate?;
        let city = City::new(placemark.locality.clone().unwrap_or_default(), country);

        Some(Self::new(
            city,
            placemark.street_line(),
            placemark.postal_code.clone().unwrap_or_default(),
            coordinate,
        ))
    }

    pub fn city(&self) -> &City {
        &self.city
    }

    pub fn country(&self) -> &Country {
        self.city.country()
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn zip_code(&self) -> &str {
        &self.zip_code
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// The address position as a fix timestamped now.
    pub fn location(&self) -> Location {
        Location::from(self.coordinate)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} {}, {}",
            self.street,
            self.zip_code,
            self.city.name(),
            self.country().name()
        )
    }
}

/// Persisted form of an [`Address`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub city: String,
    pub country: String,
    pub iso: String,
    pub street: String,
    pub zip: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<AddressRecord> for Address {
    fn from(record: AddressRecord) -> Self {
        let country = Country::new(record.iso, record.country);
        Address::new(
            City::new(record.city, country),
            record.street,
            record.zip,
            Coordinate::new(record.latitude, record.longitude),
        )
    }
}

impl From<Address> for AddressRecord {
    fn from(address: Address) -> Self {
        Self {
            city: address.city.name.clone(),
            country: address.city.country.name.clone(),
            iso: address.city.country.iso.clone(),
            street: address.street,
            zip: address.zip_code,
            latitude: address.coordinate.latitude,
            longitude: address.coordinate.longitude,
        }
    }
}
