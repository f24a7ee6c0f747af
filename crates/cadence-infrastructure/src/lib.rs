//! Infrastructure layer for Cadence.
//!
//! SQLite persistence for conversations and the message queue, platform
//! paths, and TOML configuration loading.

pub mod config_service;
pub mod dto;
pub mod paths;
pub mod sqlite;

pub use config_service::ConfigService;
pub use paths::{CadencePaths, PathError};
pub use sqlite::{SqliteStore, resolve_database_path};
