//! Configuration type definitions for Plugwarden
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::plugins::types::PluginConfig;

/// Main configuration struct for Plugwarden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log output format, level and destination
    pub logging: LoggingConfig,
    /// Supervision timings and thresholds
    pub manager: ManagerConfig,
    /// Declarative plugin manifest (used for planning and validation)
    pub plugins: Vec<PluginManifest>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output
    Pretty,
    /// Compact single-line output with component fields
    #[default]
    Component,
    /// JSON lines
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Optional file to append log lines to (JSON format only).
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}

// ============================================================================
// Manager Configuration
// ============================================================================

/// Timings and thresholds for the plugin manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Period of the health monitor loop.
    pub health_check_interval_ms: u64,
    /// A plugin whose heartbeat is older than this is reported as stale.
    pub heartbeat_timeout_ms: u64,
    /// Recovery fires once `error_count` exceeds this value.
    pub error_threshold: u32,
    /// Linear backoff unit between initialization attempts.
    pub retry_backoff_ms: u64,
    /// Whether the health monitor task is started with the manager.
    pub health_monitor_enabled: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 10_000,
            heartbeat_timeout_ms: 30_000,
            error_threshold: 10,
            retry_backoff_ms: 1_000,
            health_monitor_enabled: true,
        }
    }
}

// ============================================================================
// Plugin Manifest
// ============================================================================

/// One plugin declaration in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin id.
    pub id: String,
    /// Remaining fields are the plugin's configuration.
    #[serde(flatten)]
    pub config: PluginConfig,
}
