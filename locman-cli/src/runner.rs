//! CLI runner for common setup.
//!
//! Loads the configuration, initializes logging, owns the Tokio runtime and
//! builds the location manager used by every command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::info;

use locman::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use locman::config::ConfigFile;
use locman::logging::{init_logging, LoggingGuard};
use locman::provider::{Geocoder, LocationSource, ManualLocationSource};
use locman::LocationManager;

use crate::commands::common::load_geocoder;
use crate::error::CliError;

/// Options shared by all commands.
#[derive(Debug, Default)]
pub struct GlobalArgs<'a> {
    pub config: Option<&'a Path>,
    pub gazetteer: Option<&'a Path>,
    pub no_throttle: bool,
}

/// Manages the CLI lifecycle.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Load config, initialize logging and start the runtime.
    pub fn new(args: &GlobalArgs<'_>) -> Result<Self, CliError> {
        let mut config = match args.config {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };
        if args.no_throttle {
            config.manager.min_resolution_interval = Duration::ZERO;
        }

        let logging_guard = init_logging(&config.log_directory, &config.log_file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            runtime,
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Locman v{}", locman::VERSION);
        info!("Locman CLI: {} command", command);
    }

    /// Build a manager backed by the gazetteer and a manual location source.
    pub fn create_manager(
        &self,
        gazetteer: Option<&Path>,
        follow_address: bool,
    ) -> Result<(LocationManager, Arc<ManualLocationSource>), CliError> {
        let mut manager_config = self.config.manager.clone();
        if follow_address {
            manager_config.follow_address = true;
        }

        let geocoder: Arc<dyn Geocoder> = Arc::new(load_geocoder(gazetteer)?);
        let source = Arc::new(ManualLocationSource::new());

        let store: Arc<dyn CacheStore> = match &self.config.cache_path {
            Some(path) => {
                info!(path = %path.display(), "Using file address cache");
                Arc::new(FileCacheStore::new(path))
            }
            None => {
                info!("Using in-memory address cache");
                Arc::new(MemoryCacheStore::new())
            }
        };

        let _guard = self.runtime.enter();
        let manager = LocationManager::new(
            manager_config,
            Arc::clone(&source) as Arc<dyn LocationSource>,
            geocoder,
            store,
        )?;

        Ok((manager, source))
    }
}
