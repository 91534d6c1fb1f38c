//! Forward and reverse lookup commands.

use futures::future::join_all;
use tracing::info;

use locman::{Location, LocationError};

use super::common::format_address;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalArgs};

/// Forward geocode every query.
///
/// All queries are submitted together, so repeated queries share one
/// geocoder call and the rest are answered in submission order.
pub fn run_resolve(global: &GlobalArgs<'_>, queries: &[String]) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("resolve");
    let (manager, _source) = runner.create_manager(global.gazetteer, false)?;

    let results = runner.runtime().block_on(async {
        join_all(queries.iter().map(|query| manager.resolve_query(query))).await
    });

    let mut failures = 0;
    for (query, result) in queries.iter().zip(results) {
        match result {
            Ok(Some(address)) => println!("{} => {}", query, format_address(&address)),
            Ok(None) => println!("{} => (no usable address)", query),
            Err(e) => {
                failures += 1;
                println!("{} => error: {}", query, e);
            }
        }
    }

    if let Err(e) = manager.save_cache() {
        tracing::warn!(error = %e, "Failed to save address cache");
    }
    info!(
        queries = queries.len(),
        failures,
        cached = manager.registry().cache_len(),
        "Resolve finished"
    );

    if failures == queries.len() && !queries.is_empty() {
        return Err(CliError::Resolve(LocationError::NoResultFound));
    }
    Ok(())
}

/// Reverse geocode one coordinate.
pub fn run_reverse(global: &GlobalArgs<'_>, lat: f64, lon: f64) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("reverse");
    let (manager, _source) = runner.create_manager(global.gazetteer, false)?;

    let location = Location::new(lat, lon);
    let result = runner
        .runtime()
        .block_on(manager.resolve_location(location))
        .map_err(CliError::Resolve)?;

    match result {
        Some(address) => println!("{} => {}", location.coordinate, format_address(&address)),
        None => println!("{} => (no usable address)", location.coordinate),
    }

    if let Err(e) = manager.save_cache() {
        tracing::warn!(error = %e, "Failed to save address cache");
    }
    Ok(())
}
