//! Configuration management for Plugwarden
//!
//! Configuration is loaded from `~/.plugwarden/config.json` (or an explicit
//! path) with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{Result, WardenError};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Plugwarden configuration directory path (~/.plugwarden)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".plugwarden")
    }

    /// Returns the path to the config file (~/.plugwarden/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: PLUGWARDEN_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PLUGWARDEN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PLUGWARDEN_LOG_FORMAT") {
            if let Ok(v) = val.parse() {
                self.logging.format = v;
            }
        }
        if let Ok(val) = std::env::var("PLUGWARDEN_HEALTH_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.manager.health_check_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("PLUGWARDEN_HEARTBEAT_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.manager.heartbeat_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("PLUGWARDEN_ERROR_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.manager.error_threshold = v;
            }
        }
        if let Ok(val) = std::env::var("PLUGWARDEN_RETRY_BACKOFF_MS") {
            if let Ok(v) = val.parse() {
                self.manager.retry_backoff_ms = v;
            }
        }
    }
}
