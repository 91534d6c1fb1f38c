//! Watch command - replay a location track through the manager.
//!
//! Subscribes to location and address updates, looks up one fixed place by
//! name, then pushes the track's fixes one per interval until the track ends
//! or Ctrl+C is pressed.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use locman::ListenerOptions;

use super::common::{format_address, load_track};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalArgs};

/// Place looked up by name at the start of every watch.
const LANDMARK_QUERY: &str = "København, Danmark";

/// Arguments for the watch command.
#[derive(Debug)]
pub struct WatchArgs {
    pub track: PathBuf,
    pub interval: Duration,
    pub follow: bool,
}

pub fn run(global: &GlobalArgs<'_>, args: WatchArgs) -> Result<(), CliError> {
    let track = load_track(&args.track)?;

    let runner = CliRunner::new(global)?;
    runner.log_startup("watch");
    let (manager, source) = runner.create_manager(global.gazetteer, args.follow)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!("Replaying {} fixes from {}", track.len(), args.track.display());
    println!("Press Ctrl+C to stop");
    println!();

    let _guard = runner.runtime().enter();

    let locations = manager.subscribe_location(
        |result| match result {
            Ok(location) => println!("location: {}", location.coordinate),
            Err(e) => println!("location error: {}", e),
        },
        ListenerOptions::default(),
    );
    let addresses = manager.subscribe_address(
        |result| match result {
            Ok(Some(address)) => println!("address:  {}", format_address(&address)),
            Ok(None) => println!("address:  (no usable address)"),
            Err(e) => println!("address error: {}", e),
        },
        ListenerOptions::default(),
    );

    manager.resolve_address(LANDMARK_QUERY, |result| match result {
        Ok(Some(address)) => println!("lookup:   {} => {}", LANDMARK_QUERY, format_address(&address)),
        Ok(None) => println!("lookup:   {} => (no usable address)", LANDMARK_QUERY),
        Err(e) => println!("lookup:   {} => error: {}", LANDMARK_QUERY, e),
    });

    manager.start();

    let pushed = runner.runtime().block_on(async {
        let mut pushed = 0usize;
        for fix in &track {
            source.push(*fix);
            pushed += 1;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(args.interval) => {}
            }
        }
        pushed
    });

    manager.stop();
    locations.unlisten();
    addresses.unlisten();

    if let Err(e) = manager.save_cache() {
        tracing::warn!(error = %e, "Failed to save address cache");
    }

    info!(
        pushed,
        cached = manager.registry().cache_len(),
        "Watch finished"
    );
    println!();
    println!("Replayed {} of {} fixes", pushed, track.len());
    if let Some(address) = manager.current_address() {
        println!("Last address: {}", format_address(&address));
    }

    Ok(())
}
