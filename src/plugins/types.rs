//! Plugin configuration, metrics and status types.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Plugin and dependency ids: start alphanumeric, then alphanumerics or `_ - . :`.
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]*$").expect("valid id regex"));

/// Returns `true` if `id` is usable as a plugin or dependency id.
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

// ============================================================================
// Configuration
// ============================================================================

/// What to do when the health monitor flags a plugin as failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Destroy and re-initialize the plugin.
    #[default]
    Restart,
    /// Hand the plugin to the configured failover hook.
    Failover,
    /// Destroy and unregister the plugin.
    Terminate,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Restart => "restart",
            RecoveryStrategy::Failover => "failover",
            RecoveryStrategy::Terminate => "terminate",
        }
    }
}

/// Descriptive plugin metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginMetadata {
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Retry, timeout and recovery settings for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandling {
    /// Total initialization attempts (at least 1).
    pub retry_attempts: u32,
    /// Per-attempt initialization timeout.
    pub timeout_ms: u64,
    pub recovery_strategy: RecoveryStrategy,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            timeout_ms: 5_000,
            recovery_strategy: RecoveryStrategy::Restart,
        }
    }
}

/// Configuration supplied with a plugin registration.
///
/// # Defaults
///
/// - `dependencies`: empty
/// - `options`: `null`
/// - `error_handling`: 3 attempts, 5000ms timeout, restart on failure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub metadata: PluginMetadata,
    /// Ids that must be initialized before this plugin.
    pub dependencies: Vec<String>,
    /// Opaque options passed to `Plugin::initialize`.
    pub options: serde_json::Value,
    pub error_handling: ErrorHandling,
}

impl PluginConfig {
    /// Add a dependency (builder style).
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.error_handling.retry_attempts = attempts;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.error_handling.timeout_ms = timeout_ms;
        self
    }

    pub fn with_recovery(mut self, strategy: RecoveryStrategy) -> Self {
        self.error_handling.recovery_strategy = strategy;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = Some(version.into());
        self
    }

    /// Validate and normalize for registration under `id`.
    ///
    /// Dependencies are de-duplicated keeping first-declared order.
    pub fn normalize(mut self, id: &str) -> Result<Self> {
        if !is_valid_id(id) {
            return Err(WardenError::InvalidConfiguration(format!(
                "plugin id '{}' is empty or malformed",
                id
            )));
        }

        let mut seen = std::collections::HashSet::new();
        let mut deps = Vec::with_capacity(self.dependencies.len());
        for dep in self.dependencies {
            if !is_valid_id(&dep) {
                return Err(WardenError::InvalidConfiguration(format!(
                    "plugin '{}' declares malformed dependency id '{}'",
                    id, dep
                )));
            }
            if seen.insert(dep.clone()) {
                deps.push(dep);
            }
        }
        self.dependencies = deps;

        if self.error_handling.retry_attempts == 0 {
            return Err(WardenError::InvalidConfiguration(format!(
                "plugin '{}': retry_attempts must be at least 1",
                id
            )));
        }
        if self.error_handling.timeout_ms == 0 {
            return Err(WardenError::InvalidConfiguration(format!(
                "plugin '{}': timeout_ms must be greater than 0",
                id
            )));
        }

        Ok(self)
    }
}

// ============================================================================
// Runtime state
// ============================================================================

/// Per-plugin health counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetrics {
    pub last_heartbeat: DateTime<Utc>,
    pub error_count: u32,
    pub warning_count: u32,
}

impl PluginMetrics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat: now,
            error_count: 0,
            warning_count: 0,
        }
    }
}

/// Lifecycle state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Registered,
    Initializing,
    Initialized,
    FailedInit,
    Recovering,
    /// A recovery restart ran out of attempts. The monitor leaves the plugin
    /// alone until it is restarted or initialized explicitly.
    RecoveryFailed,
    FailoverInvoked,
    Terminated,
}

impl PluginState {
    /// States during which recovery must not be started.
    pub fn is_busy(&self) -> bool {
        matches!(self, PluginState::Initializing | PluginState::Recovering)
    }

    /// States the health monitor may hand to the recovery controller.
    pub fn accepts_recovery(&self) -> bool {
        !self.is_busy() && *self != PluginState::RecoveryFailed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Initializing => "initializing",
            PluginState::Initialized => "initialized",
            PluginState::FailedInit => "failed_init",
            PluginState::Recovering => "recovering",
            PluginState::RecoveryFailed => "recovery_failed",
            PluginState::FailoverInvoked => "failover_invoked",
            PluginState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable point-in-time view of one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub id: String,
    pub state: PluginState,
    pub is_initialized: bool,
    pub metadata: PluginMetadata,
    pub dependencies: Vec<String>,
    pub recovery_strategy: RecoveryStrategy,
    pub metrics: PluginMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("wallet"));
        assert!(is_valid_id("market-data.v2"));
        assert!(is_valid_id("dex:uniswap_v3"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(" wallet"));
        assert!(!is_valid_id("-wallet"));
        assert!(!is_valid_id("wal let"));
    }

    #[test]
    fn test_error_handling_defaults() {
        let eh = ErrorHandling::default();
        assert_eq!(eh.retry_attempts, 3);
        assert_eq!(eh.timeout_ms, 5_000);
        assert_eq!(eh.recovery_strategy, RecoveryStrategy::Restart);
    }

    #[test]
    fn test_partial_error_handling_merges_defaults() {
        let cfg: PluginConfig =
            serde_json::from_str(r#"{"error_handling": {"timeout_ms": 250}}"#).unwrap();
        assert_eq!(cfg.error_handling.timeout_ms, 250);
        assert_eq!(cfg.error_handling.retry_attempts, 3);
        assert!(cfg.options.is_null());
    }

    #[test]
    fn test_normalize_dedups_dependencies() {
        let cfg = PluginConfig::default()
            .depends_on("b")
            .depends_on("a")
            .depends_on("b")
            .normalize("c")
            .unwrap();
        assert_eq!(cfg.dependencies, vec!["b", "a"]);
    }

    #[test]
    fn test_normalize_rejects_empty_dependency() {
        let err = PluginConfig::default()
            .depends_on("")
            .normalize("c")
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_normalize_rejects_zero_attempts_and_timeout() {
        let err = PluginConfig::default()
            .with_retry_attempts(0)
            .normalize("c")
            .unwrap_err();
        assert!(err.to_string().contains("retry_attempts"));

        let err = PluginConfig::default()
            .with_timeout_ms(0)
            .normalize("c")
            .unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_recovery_strategy_serde() {
        let s: RecoveryStrategy = serde_json::from_str("\"failover\"").unwrap();
        assert_eq!(s, RecoveryStrategy::Failover);
        assert_eq!(serde_json::to_string(&RecoveryStrategy::Terminate).unwrap(), "\"terminate\"");
    }

    #[test]
    fn test_busy_states() {
        assert!(PluginState::Initializing.is_busy());
        assert!(PluginState::Recovering.is_busy());
        assert!(!PluginState::Initialized.is_busy());
        assert!(!PluginState::FailedInit.is_busy());
    }

    #[test]
    fn test_accepts_recovery() {
        assert!(PluginState::Initialized.accepts_recovery());
        assert!(PluginState::FailedInit.accepts_recovery());
        assert!(!PluginState::Recovering.accepts_recovery());
        assert!(!PluginState::RecoveryFailed.accepts_recovery());
        assert!(!PluginState::RecoveryFailed.is_busy());
    }
}
