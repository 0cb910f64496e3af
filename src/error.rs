//! Error types for Plugwarden
//!
//! This module defines all error types used throughout the orchestrator.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations. Failures reported by plugin code itself are
//! carried as `anyhow::Error` sources.

use thiserror::Error;

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Plugwarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// A plugin with the same id is already registered.
    #[error("Plugin '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Malformed plugin id, dependency id or error-handling settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A declared dependency is not registered.
    #[error("Missing dependency '{name}' required by '{required_by}'")]
    MissingDependency { name: String, required_by: String },

    /// The dependency graph contains a cycle; `path` runs from the cycle's
    /// start back to the revisited node.
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A single initialization attempt did not finish in time.
    #[error("Plugin '{id}' initialization timed out after {timeout_ms}ms")]
    InitializationTimeout { id: String, timeout_ms: u64 },

    /// A single initialization attempt reported a failure.
    #[error("Plugin '{id}' failed: {source}")]
    PluginFailure {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// All initialization attempts were exhausted.
    #[error("Plugin '{id}' failed to initialize after {attempts} attempt(s): {source}")]
    PluginInitializationFailed {
        id: String,
        attempts: u32,
        #[source]
        source: Box<WardenError>,
    },

    /// Another initialization of the same plugin is still running.
    #[error("Plugin '{0}' is already initializing")]
    InitializationInProgress(String),

    /// `destroy()` failed; the plugin stays registered.
    #[error("Plugin '{id}' failed to terminate: {source}")]
    TerminationFailure {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The failover hook reported a failure.
    #[error("Failover for plugin '{id}' failed: {source}")]
    FailoverFailure {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A capability with the same name is already registered.
    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    /// Resource not found (plugins, capabilities)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WardenError {
    /// Returns `true` for errors raised while building or resolving the
    /// dependency graph.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            WardenError::MissingDependency { .. } | WardenError::CircularDependency { .. }
        )
    }

    /// Number of attempts recorded on an exhausted initialization.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            WardenError::PluginInitializationFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// A specialized `Result` type for Plugwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
