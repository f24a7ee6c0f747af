//! Unified path management for cadence files.
//!
//! Configuration lives in the platform config directory, the database and
//! logs in the platform data directory, resolved through the `dirs` crate.

use cadence_core::CadenceError;
use std::path::PathBuf;

const APP_DIR: &str = "cadence";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform directory could not be determined.
    DirNotFound(&'static str),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::DirNotFound(kind) => write!(f, "Cannot find {} directory", kind),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for CadenceError {
    fn from(err: PathError) -> Self {
        CadenceError::config(err.to_string())
    }
}

/// Unified path management for cadence.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/cadence/           # Config directory
/// └── config.toml              # Application configuration
///
/// ~/.local/share/cadence/      # Data directory
/// ├── cadence.db               # Conversations and message queue
/// └── logs/                    # Application logs
///     └── cadence.log.YYYY-MM-DD
/// ```
pub struct CadencePaths;

impl CadencePaths {
    /// Returns the cadence configuration directory.
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("config"))
    }

    /// Returns the cadence data directory.
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DirNotFound("data"))
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the default SQLite database path.
    pub fn database_file() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("cadence.db"))
    }

    /// Returns the log directory.
    pub fn logs_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("logs"))
    }
}
