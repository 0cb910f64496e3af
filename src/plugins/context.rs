//! Runtime context handed to plugins.
//!
//! A [`PluginContext`] bundles the collaborators a plugin may use while it
//! runs: the shared capability registry, the event bus, a structured logger
//! tagged with the plugin id, and activity reporting (heartbeats, errors and
//! warnings) that feeds the health monitor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, SubscriptionId};
use crate::error::{Result, WardenError};
use crate::utils::clock::Clock;

use super::registry::SharedRegistry;

// ============================================================================
// Capabilities
// ============================================================================

/// Async handler behind a named capability.
pub type CapabilityHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

struct Capability {
    owner: String,
    handler: CapabilityHandler,
}

/// Named operations exposed by plugins, keyed by capability name.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: Arc<RwLock<HashMap<String, Capability>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` on behalf of plugin `owner`.
    pub fn register(&self, owner: &str, name: &str, handler: CapabilityHandler) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Err(WardenError::DuplicateCapability(name.to_string()));
        }
        entries.insert(
            name.to_string(),
            Capability {
                owner: owner.to_string(),
                handler,
            },
        );
        debug!(plugin = %owner, capability = %name, "Capability registered");
        Ok(())
    }

    /// Remove `name` if it is owned by `owner`.
    pub fn unregister(&self, owner: &str, name: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(name) {
            Some(cap) if cap.owner == owner => {
                entries.remove(name);
                debug!(plugin = %owner, capability = %name, "Capability unregistered");
                true
            }
            Some(cap) => {
                warn!(
                    plugin = %owner,
                    capability = %name,
                    owner = %cap.owner,
                    "Refusing to unregister capability owned by another plugin"
                );
                false
            }
            None => false,
        }
    }

    /// Remove every capability owned by `owner`, returning their names.
    pub fn unregister_owner(&self, owner: &str) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<String> = entries
            .iter()
            .filter(|(_, cap)| cap.owner == owner)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            entries.remove(name);
        }
        names
    }

    /// Look up a capability, returning its owner and handler.
    pub fn get(&self, name: &str) -> Option<(String, CapabilityHandler)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .map(|cap| (cap.owner.clone(), Arc::clone(&cap.handler)))
    }

    /// Sorted capability names.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// Logger
// ============================================================================

/// Structured logger scoped to one plugin.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: String,
}

impl PluginLogger {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }

    pub fn debug(&self, message: &str, context: &Value) {
        debug!(plugin = %self.plugin_id, context = %context, "{}", message);
    }

    pub fn info(&self, message: &str, context: &Value) {
        info!(plugin = %self.plugin_id, context = %context, "{}", message);
    }

    pub fn warn(&self, message: &str, context: &Value) {
        warn!(plugin = %self.plugin_id, context = %context, "{}", message);
    }

    pub fn error(&self, message: &str, err: &dyn std::fmt::Display, context: &Value) {
        error!(plugin = %self.plugin_id, error = %err, context = %context, "{}", message);
    }
}

// ============================================================================
// Context
// ============================================================================

/// Everything a plugin can reach while it runs. Cheap to clone; plugins that
/// report heartbeats after `initialize` returns should keep a clone.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    capabilities: CapabilityRegistry,
    bus: EventBus,
    logger: PluginLogger,
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
}

impl PluginContext {
    pub(crate) fn new(
        plugin_id: &str,
        capabilities: CapabilityRegistry,
        bus: EventBus,
        registry: SharedRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            capabilities,
            bus,
            logger: PluginLogger::new(plugin_id),
            registry,
            clock,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Expose `name` to the rest of the system.
    pub fn register_capability<F, Fut>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: CapabilityHandler = Arc::new(move |args| handler(args).boxed());
        self.capabilities.register(&self.plugin_id, name, handler)
    }

    /// Withdraw a capability previously registered by this plugin.
    pub fn unregister_capability(&self, name: &str) -> bool {
        self.capabilities.unregister(&self.plugin_id, name)
    }

    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bus.on(event, handler)
    }

    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.bus.off(event, id)
    }

    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        self.bus.emit(event, payload)
    }

    /// Mark this plugin as alive now.
    pub async fn heartbeat(&self) {
        let now = self.clock.now();
        self.registry
            .write()
            .await
            .record_heartbeat(&self.plugin_id, now);
    }

    /// Count a runtime error against this plugin.
    pub async fn report_error(&self) {
        self.registry.write().await.record_error(&self.plugin_id);
    }

    /// Count a runtime warning against this plugin.
    pub async fn report_warning(&self) {
        self.registry.write().await.record_warning(&self.plugin_id);
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}
