//! Configuration service implementation.
//!
//! This module provides a ConfigService that loads the application
//! configuration from config.toml (~/.config/cadence/config.toml by default).

use crate::paths::CadencePaths;
use cadence_core::config::AppConfig;
use cadence_core::{CadenceError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the application configuration.
///
/// This implementation reads the configuration from config.toml
/// and caches it to avoid repeated file I/O operations. A missing file is
/// created with the defaults.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    /// Creates a ConfigService for the platform default config file.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(CadencePaths::config_file()?))
    }

    /// Creates a ConfigService reading an explicit file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<AppConfig> {
        // Check if already cached
        {
            let read_lock = self
                .config
                .read()
                .map_err(|_| CadenceError::internal("config cache lock poisoned"))?;
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load_config()?;

        {
            let mut write_lock = self
                .config
                .write()
                .map_err(|_| CadenceError::internal("config cache lock poisoned"))?;
            *write_lock = Some(loaded.clone());
        }

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    fn load_config(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let default_config = AppConfig::default();
            self.write_config(&default_config)?;
            tracing::info!(
                "[Config] Wrote default configuration to {}",
                self.path.display()
            );
            return Ok(default_config);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: AppConfig = toml::from_str(&content)?;
        tracing::debug!("[Config] Loaded {}", self.path.display());
        Ok(config)
    }

    fn write_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let service = ConfigService::with_path(&path);

        let config = service.get_config().unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reread: AppConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn cache_is_used_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let service = ConfigService::with_path(&path);

        assert_eq!(service.get_config().unwrap().logging.level, "debug");

        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(service.get_config().unwrap().logging.level, "debug");

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().logging.level, "warn");
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\ncommand = ").unwrap();

        let err = ConfigService::with_path(&path).get_config().unwrap_err();
        assert!(matches!(err, CadenceError::Serialization { ref format, .. } if format == "TOML"));
    }
}
