//! Locman CLI - command-line front end
//!
//! Drives the locman facade with an offline gazetteer and a replayed
//! location track.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use commands::watch::WatchArgs;
use runner::GlobalArgs;

#[derive(Parser)]
#[command(name = "locman")]
#[command(version, about = "Location and geocoding facade demo", long_about = None)]
struct Cli {
    /// Config file (default: ~/.locman/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gazetteer JSON file (array of placemarks) used as the geocoder
    #[arg(long, global = true)]
    gazetteer: Option<PathBuf>,

    /// Disable the minimum interval between geocoder calls
    #[arg(long, global = true)]
    no_throttle: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward geocode one or more queries
    Resolve {
        /// Free-form queries, e.g. "København, Danmark"
        #[arg(required = true)]
        queries: Vec<String>,
    },

    /// Reverse geocode a coordinate
    Reverse {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Replay a location track and print location and address updates
    Watch {
        /// Track file with one 'latitude,longitude' pair per line
        #[arg(long)]
        track: PathBuf,

        /// Delay between fixes in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Reverse geocode fixes as they arrive
        #[arg(long)]
        follow: bool,
    },

    /// Show the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config: cli.config.as_deref(),
        gazetteer: cli.gazetteer.as_deref(),
        no_throttle: cli.no_throttle,
    };

    let result = match cli.command {
        Commands::Resolve { queries } => commands::resolve::run_resolve(&global, &queries),
        Commands::Reverse { lat, lon } => commands::resolve::run_reverse(&global, lat, lon),
        Commands::Watch {
            track,
            interval_ms,
            follow,
        } => commands::watch::run(
            &global,
            WatchArgs {
                track,
                interval: Duration::from_millis(interval_ms),
                follow,
            },
        ),
        Commands::Config => commands::config::run(&global),
    };

    if let Err(e) = result {
        e.exit();
    }
}
