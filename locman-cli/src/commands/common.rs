//! Common helpers shared across CLI commands.

use std::path::Path;

use locman::geo::Placemark;
use locman::provider::StaticGeocoder;
use locman::{Address, Coordinate, Location};

use crate::error::CliError;

/// Load the gazetteer at `path`, or the built-in one.
pub fn load_geocoder(path: Option<&Path>) -> Result<StaticGeocoder, CliError> {
    match path {
        Some(path) => StaticGeocoder::from_json_file(path).map_err(|error| CliError::Gazetteer {
            path: path.to_path_buf(),
            error,
        }),
        None => Ok(StaticGeocoder::new(builtin_gazetteer())),
    }
}

/// A handful of places so the demo works without a gazetteer file.
pub fn builtin_gazetteer() -> Vec<Placemark> {
    vec![
        place("København", "Danmark", "DK", "Rådhuspladsen", "1", "1550", 55.6761, 12.5683),
        place("Aarhus", "Danmark", "DK", "Rådhuspladsen", "2", "8000", 56.1529, 10.2039),
        place("London", "United Kingdom", "GB", "Downing Street", "10", "SW1A 2AA", 51.5034, -0.1276),
        place("Paris", "France", "FR", "Rue de Rivoli", "99", "75001", 48.8606, 2.3376),
    ]
}

#[allow(clippy::too_many_arguments)]
fn place(
    locality: &str,
    country: &str,
    iso: &str,
    street: &str,
    number: &str,
    postal_code: &str,
    lat: f64,
    lon: f64,
) -> Placemark {
    Placemark {
        locality: Some(locality.to_string()),
        country: Some(country.to_string()),
        iso_country_code: Some(iso.to_string()),
        thoroughfare: Some(street.to_string()),
        sub_thoroughfare: Some(number.to_string()),
        postal_code: Some(postal_code.to_string()),
        coordinate: Some(Coordinate::new(lat, lon)),
    }
}

/// One-line address for terminal output.
pub fn format_address(address: &Address) -> String {
    format!(
        "{}, {} {}, {} [{}]",
        address.street(),
        address.zip_code(),
        address.city().name(),
        address.country().name(),
        address.coordinate()
    )
}

/// Parse a track: one `latitude,longitude` pair per line.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_track(content: &str) -> Result<Vec<Location>, String> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| parse_fix(line).map_err(|e| format!("line {}: {}", number, e)))
        .collect()
}

fn parse_fix(line: &str) -> Result<Location, String> {
    let (lat, lon) = line
        .split_once(',')
        .ok_or_else(|| format!("expected 'latitude,longitude', got '{}'", line))?;

    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: {}, {}", lat, lon));
    }

    Ok(Location::new(lat, lon))
}

/// Read and parse a track file.
pub fn load_track(path: &Path) -> Result<Vec<Location>, CliError> {
    let track_error = |message: String| CliError::Track {
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| track_error(e.to_string()))?;
    let track = parse_track(&content).map_err(track_error)?;
    if track.is_empty() {
        return Err(track_error("no fixes".to_string()));
    }
    Ok(track)
}
