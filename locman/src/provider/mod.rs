//! External collaborator abstraction
//!
//! The registry never talks to a platform location service or a geocoding
//! web API directly. It goes through two narrow traits:
//!
//! - [`Geocoder`]: async forward/reverse lookups returning placemark candidates
//! - [`LocationSource`]: pushes fixes and failures into a [`LocationSink`]
//!
//! Bundled implementations:
//!
//! - [`StaticGeocoder`]: offline gazetteer with call recording
//! - [`ManualLocationSource`]: push-driven source for replay and tests
//!
//! ```ignore
//! use locman::provider::{ManualLocationSource, StaticGeocoder};
//!
//! let geocoder = StaticGeocoder::from_json_file(Path::new("gazetteer.json"))?;
//! let source = ManualLocationSource::new();
//! source.push(Location::new(55.6761, 12.5683));
//! ```

mod manual;
mod static_geocoder;
mod types;

pub use manual::ManualLocationSource;
pub use static_geocoder::{GeocodeCall, StaticGeocoder, DEFAULT_REVERSE_RANGE_METERS};
pub use types::{
    BoxFuture, GeocodeError, Geocoder, LocationEvent, LocationSink, LocationSource,
};

pub use crate::geo::Placemark;
