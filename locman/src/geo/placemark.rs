//! Raw geocoder candidates.

use serde::{Deserialize, Serialize};

use super::location::Coordinate;

/// A single candidate returned by a geocoding provider.
///
/// Every field is optional because providers routinely omit data. Conversion
/// into an [`Address`](super::Address) decides which omissions are fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    /// City or town.
    #[serde(default)]
    pub locality: Option<String>,
    /// Country display name.
    #[serde(default)]
    pub country: Option<String>,
    /// ISO 3166 country code.
    #[serde(default)]
    pub iso_country_code: Option<String>,
    /// Street name.
    #[serde(default)]
    pub thoroughfare: Option<String>,
    /// House number.
    #[serde(default)]
    pub sub_thoroughfare: Option<String>,
    /// Postal code.
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Position of the place.
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
}

impl Placemark {
    /// Street line: street name followed by house number when both exist.
    pub fn street_line(&self) -> String {
        match (&self.thoroughfare, &self.sub_thoroughfare) {
            (Some(street), Some(number)) => format!("{} {}", street, number),
            (Some(street), None) => street.clone(),
            (None, Some(number)) => number.clone(),
            (None, None) => String::new(),
        }
    }

    /// Human-readable label used for forward matching.
    pub fn label(&self) -> String {
        [
            Some(self.street_line()),
            self.postal_code.clone(),
            self.locality.clone(),
            self.country.clone(),
            self.iso_country_code.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}
