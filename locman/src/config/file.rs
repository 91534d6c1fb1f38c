//! Configuration file handling for ~/.locman/config.ini.
//!
//! ```ini
//! [cache]
//! precision_meters = 200
//! path = ~/.locman/address.cache
//!
//! [resolver]
//! min_interval_secs = 10
//! throttle_policy = queue
//!
//! [listener]
//! ttl_secs = 10
//!
//! [tracking]
//! follow_address = false
//! follow_distance_meters = 200
//!
//! [logging]
//! directory = ~/.locman/logs
//! file = locman.log
//! ```
//!
//! Missing files and missing keys fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::{ManagerConfig, ThrottlePolicy};

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "locman.log";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Settings loaded from the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Registry and facade settings.
    pub manager: ManagerConfig,
    /// Address cache location; `None` keeps the cache in memory only.
    pub cache_path: Option<PathBuf>,
    /// Directory for log files.
    pub log_directory: PathBuf,
    /// Log file name.
    pub log_file: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            cache_path: Some(config_directory().join("address.cache")),
            log_directory: config_directory().join("logs"),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.locman/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }
}

/// Get the path to the config directory (~/.locman).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".locman")
}

/// Get the path to the config file (~/.locman/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = parse_number::<f64>(section, "cache", "precision_meters")? {
            if v < 0.0 {
                return Err(invalid("cache", "precision_meters", v, "must not be negative"));
            }
            config.manager.cache_precision_meters = v;
        }
        if let Some(v) = section.get("path") {
            let v = v.trim();
            config.cache_path = match v {
                "" | "none" | "memory" => None,
                path => Some(expand_tilde(path)),
            };
        }
    }

    // [resolver] section
    if let Some(section) = ini.section(Some("resolver")) {
        if let Some(v) = parse_number::<u64>(section, "resolver", "min_interval_secs")? {
            config.manager.min_resolution_interval = Duration::from_secs(v);
        }
        if let Some(v) = section.get("throttle_policy") {
            config.manager.throttle_policy = v
                .parse::<ThrottlePolicy>()
                .map_err(|reason| invalid("resolver", "throttle_policy", v, &reason))?;
        }
    }

    // [listener] section
    if let Some(section) = ini.section(Some("listener")) {
        if let Some(v) = parse_number::<u64>(section, "listener", "ttl_secs")? {
            config.manager.listener_ttl = Duration::from_secs(v);
        }
    }

    // [tracking] section
    if let Some(section) = ini.section(Some("tracking")) {
        if let Some(v) = section.get("follow_address") {
            config.manager.follow_address = parse_bool(v);
        }
        if let Some(v) = parse_number::<f64>(section, "tracking", "follow_distance_meters")? {
            config.manager.follow_distance_meters = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.log_directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.log_file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section_name, key, v, "must be a number")),
    }
}

fn invalid(section: &str, key: &str, value: impl ToString, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
