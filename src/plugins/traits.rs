//! Traits implemented by plugins and by recovery extensions.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::context::PluginContext;

/// An independently implemented capability unit managed by the orchestrator.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use plugwarden::plugins::{Plugin, PluginContext};
/// use serde_json::Value;
///
/// struct PriceFeed;
///
/// #[async_trait]
/// impl Plugin for PriceFeed {
///     async fn initialize(&self, ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
///         ctx.logger().info("price feed ready", &Value::Null);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Bring the plugin up. Called once per attempt, bounded by the
    /// configured timeout.
    async fn initialize(&self, ctx: &PluginContext, options: &Value) -> anyhow::Result<()>;

    /// Tear the plugin down. Plugins without resources keep the default.
    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Extension point invoked for plugins whose recovery strategy is failover.
#[async_trait]
pub trait FailoverHook: Send + Sync {
    async fn failover(&self, plugin_id: &str) -> anyhow::Result<()>;
}

/// Default failover hook: records the request and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyFailover;

#[async_trait]
impl FailoverHook for LogOnlyFailover {
    async fn failover(&self, plugin_id: &str) -> anyhow::Result<()> {
        info!(plugin = %plugin_id, "Failover requested; no failover hook configured");
        Ok(())
    }
}
