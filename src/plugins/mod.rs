//! Plugin lifecycle orchestration.
//!
//! Plugins are registered with their dependencies and error-handling
//! settings, initialized in dependency order with bounded retries and
//! per-attempt timeouts, watched by a periodic health monitor, and recovered
//! by restarting, failing over or terminating them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use plugwarden::config::ManagerConfig;
//! use plugwarden::plugins::{Plugin, PluginConfig, PluginContext, PluginManager};
//! use serde_json::Value;
//!
//! struct Wallet;
//!
//! #[async_trait]
//! impl Plugin for Wallet {
//!     async fn initialize(&self, _ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> plugwarden::Result<()> {
//! let manager = PluginManager::builder(ManagerConfig::default()).build();
//! manager.register("wallet", Arc::new(Wallet), PluginConfig::default()).await?;
//! manager.initialize_all().await?;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod health;
pub mod initializer;
pub mod manager;
pub mod recovery;
pub mod registry;
pub mod resolver;
pub mod traits;
pub mod types;

pub use context::{CapabilityHandler, CapabilityRegistry, PluginContext, PluginLogger};
pub use health::{HealthMonitor, HealthReport};
pub use initializer::Initializer;
pub use manager::{PluginManager, PluginManagerBuilder};
pub use recovery::{RecoveryController, RecoveryOutcome};
pub use registry::{PluginEntry, Registry, SharedRegistry};
pub use resolver::DependencyGraph;
pub use traits::{FailoverHook, LogOnlyFailover, Plugin};
pub use types::{
    ErrorHandling, PluginConfig, PluginMetadata, PluginMetrics, PluginState, PluginStatus,
    RecoveryStrategy,
};
