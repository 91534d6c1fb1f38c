//! Geographic data model.
//!
//! Only the fields needed for caching, matching and display are modelled:
//! fixes ([`Location`]), resolved places ([`Address`], [`City`], [`Country`])
//! and raw geocoder candidates ([`Placemark`]).

mod address;
mod location;
mod placemark;

pub use address::{Address, AddressRecord, City, Country};
pub use location::{Coordinate, Location, EARTH_RADIUS_METERS};
pub use placemark::Placemark;
