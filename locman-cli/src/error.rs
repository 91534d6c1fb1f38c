//! CLI error handling with user-friendly messages.

use std::fmt;
use std::path::PathBuf;
use std::process;

use locman::config::ConfigFileError;
use locman::{LocationError, SetupError};

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to create the location manager
    Setup(SetupError),
    /// Failed to load the gazetteer
    Gazetteer { path: PathBuf, error: std::io::Error },
    /// Failed to read or parse a location track
    Track { path: PathBuf, message: String },
    /// A resolution failed
    Resolve(LocationError),
}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Track { .. } = self {
            eprintln!();
            eprintln!("Track files contain one 'latitude,longitude' pair per line.");
            eprintln!("Blank lines and lines starting with '#' are ignored.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Setup(e) => write!(f, "Failed to create location manager: {}", e),
            CliError::Gazetteer { path, error } => {
                write!(f, "Failed to load gazetteer '{}': {}", path.display(), error)
            }
            CliError::Track { path, message } => {
                write!(f, "Invalid track '{}': {}", path.display(), message)
            }
            CliError::Resolve(e) => write!(f, "Resolution failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Setup(e) => Some(e),
            CliError::Gazetteer { error, .. } => Some(error),
            CliError::Resolve(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<SetupError> for CliError {
    fn from(e: SetupError) -> Self {
        CliError::Setup(e)
    }
}
