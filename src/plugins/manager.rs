//! The plugin manager facade.
//!
//! [`PluginManager`] wires the registry, initializer, recovery controller and
//! health monitor together behind one handle. Build it with
//! [`PluginManager::builder`]; the health monitor starts with it when enabled
//! and stops on [`PluginManager::shutdown`] or drop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, LifecycleEvent};
use crate::config::ManagerConfig;
use crate::error::{Result, WardenError};
use crate::utils::clock::{Clock, SystemClock};

use super::context::CapabilityRegistry;
use super::health::{HealthMonitor, HealthReport};
use super::initializer::Initializer;
use super::recovery::{RecoveryController, RecoveryOutcome};
use super::registry::{Registry, SharedRegistry};
use super::traits::{FailoverHook, LogOnlyFailover, Plugin};
use super::types::{PluginConfig, PluginStatus};

/// Builder for [`PluginManager`].
pub struct PluginManagerBuilder {
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    failover: Arc<dyn FailoverHook>,
    bus: EventBus,
}

impl PluginManagerBuilder {
    /// Use a custom time source (tests use `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default log-only failover hook.
    pub fn with_failover_hook(mut self, hook: Arc<dyn FailoverHook>) -> Self {
        self.failover = hook;
        self
    }

    /// Share an existing event bus.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Assemble the manager and start the health monitor if enabled.
    ///
    /// The monitor is a tokio task; outside a runtime it is not started and
    /// a warning is logged.
    pub fn build(self) -> PluginManager {
        let registry = Registry::shared();
        let capabilities = CapabilityRegistry::new();
        let initializer = Initializer::new(
            Arc::clone(&registry),
            capabilities.clone(),
            self.bus.clone(),
            Arc::clone(&self.clock),
            Duration::from_millis(self.config.retry_backoff_ms),
        );
        let recovery = RecoveryController::new(
            Arc::clone(&registry),
            initializer.clone(),
            capabilities.clone(),
            self.bus.clone(),
            self.failover,
        );
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            recovery.clone(),
            self.bus.clone(),
            Arc::clone(&self.clock),
            &self.config,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = if !self.config.health_monitor_enabled {
            debug!("Health monitor disabled");
            None
        } else if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime available; health monitor not started");
            None
        } else {
            Some(monitor.clone().spawn(shutdown_rx))
        };
        crate::log_component!(
            info,
            "manager",
            "Plugin manager ready",
            health_monitor = handle.is_some()
        );

        PluginManager {
            registry,
            capabilities,
            bus: self.bus,
            clock: self.clock,
            initializer,
            recovery,
            monitor,
            shutdown_tx,
            monitor_handle: Mutex::new(handle),
        }
    }
}

/// Registers, initializes, supervises and recovers plugins.
pub struct PluginManager {
    registry: SharedRegistry,
    capabilities: CapabilityRegistry,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    initializer: Initializer,
    recovery: RecoveryController,
    monitor: HealthMonitor,
    shutdown_tx: watch::Sender<bool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PluginManager {
    pub fn builder(config: ManagerConfig) -> PluginManagerBuilder {
        PluginManagerBuilder {
            config,
            clock: Arc::new(SystemClock),
            failover: Arc::new(LogOnlyFailover),
            bus: EventBus::new(),
        }
    }

    /// Manager with default settings and a running health monitor.
    pub fn new() -> Self {
        Self::builder(ManagerConfig::default()).build()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a plugin. See [`Registry::register`] for the error cases.
    pub async fn register(
        &self,
        id: &str,
        instance: Arc<dyn Plugin>,
        config: PluginConfig,
    ) -> Result<()> {
        let dependencies = {
            let mut registry = self.registry.write().await;
            registry.register(id, instance, config, self.clock.now())?;
            registry.graph().dependencies_of(id).to_vec()
        };
        self.bus.publish(&LifecycleEvent::Registered {
            id: id.to_string(),
            dependencies,
        });
        Ok(())
    }

    /// Drop a plugin without calling `destroy`. Returns `false` if unknown.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.registry.write().await.remove(id).is_some();
        if removed {
            self.capabilities.unregister_owner(id);
            info!(plugin = %id, "Plugin removed");
        }
        removed
    }

    /// Current initialization order.
    pub async fn resolve_order(&self) -> Result<Vec<String>> {
        self.registry.read().await.resolve_order()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Initialize every plugin in dependency order.
    pub async fn initialize_all(&self) -> Result<Vec<String>> {
        self.initializer.initialize_all().await
    }

    pub async fn initialize_one(&self, id: &str) -> Result<()> {
        self.initializer.initialize_one(id).await
    }

    /// Apply the plugin's recovery strategy now.
    pub async fn handle_failure(&self, id: &str) -> RecoveryOutcome {
        self.recovery.handle_failure(id).await
    }

    pub async fn restart(&self, id: &str) -> Result<()> {
        self.recovery.restart(id).await
    }

    /// Destroy and unregister a plugin; it stays registered if `destroy`
    /// fails.
    pub async fn terminate(&self, id: &str) -> bool {
        self.recovery.terminate(id).await
    }

    /// Run one health pass including recovery.
    pub async fn check_health(&self) -> (HealthReport, Vec<(String, RecoveryOutcome)>) {
        self.monitor.tick().await
    }

    // ------------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------------

    /// Refresh a plugin's heartbeat. Returns `false` for unknown ids.
    pub async fn heartbeat(&self, id: &str) -> bool {
        self.registry
            .write()
            .await
            .record_heartbeat(id, self.clock.now())
    }

    pub async fn record_error(&self, id: &str) -> Option<u32> {
        self.registry.write().await.record_error(id)
    }

    pub async fn record_warning(&self, id: &str) -> Option<u32> {
        self.registry.write().await.record_warning(id)
    }

    /// Call a capability by name.
    ///
    /// Success refreshes the owning plugin's heartbeat; failure counts an
    /// error against it.
    ///
    /// # Errors
    ///
    /// [`WardenError::NotFound`] for unknown capabilities and
    /// [`WardenError::PluginFailure`] when the handler fails.
    pub async fn invoke_capability(&self, name: &str, args: Value) -> Result<Value> {
        let (owner, handler) = self
            .capabilities
            .get(name)
            .ok_or_else(|| WardenError::NotFound(format!("capability '{}'", name)))?;

        match handler(args).await {
            Ok(value) => {
                self.registry
                    .write()
                    .await
                    .record_heartbeat(&owner, self.clock.now());
                Ok(value)
            }
            Err(source) => {
                let error_count = self.registry.write().await.record_error(&owner);
                warn!(
                    plugin = %owner,
                    capability = %name,
                    error_count = error_count.unwrap_or_default(),
                    error = %source,
                    "Capability invocation failed"
                );
                Err(WardenError::PluginFailure { id: owner, source })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub async fn status(&self, id: &str) -> Option<PluginStatus> {
        self.registry.read().await.status(id)
    }

    pub async fn statuses(&self) -> Vec<PluginStatus> {
        self.registry.read().await.statuses()
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether the background health monitor is running.
    pub fn monitor_running(&self) -> bool {
        self.monitor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the health monitor and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .monitor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
        info!("Plugin manager shut down");
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        let handle = self
            .monitor_handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::context::PluginContext;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Adder;

    #[async_trait]
    impl Plugin for Adder {
        async fn initialize(&self, ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
            ctx.register_capability("math.add", |args: Value| async move {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                Ok::<Value, anyhow::Error>(json!(a + b))
            })?;
            ctx.register_capability("math.fail", |_| async {
                Err::<Value, anyhow::Error>(anyhow::anyhow!("division by zero"))
            })?;
            Ok(())
        }
    }

    fn quiet_config() -> ManagerConfig {
        ManagerConfig {
            health_monitor_enabled: false,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_publishes_event() {
        let manager = PluginManager::builder(quiet_config()).build();
        let seen = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&seen);
        manager
            .bus()
            .on(crate::bus::event::PLUGIN_REGISTERED, move |payload| {
                assert_eq!(payload["id"], "adder");
                counter.fetch_add(1, Ordering::SeqCst);
            });

        manager
            .register("adder", Arc::new(Adder), PluginConfig::default())
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_capability_refreshes_heartbeat() {
        let clock = ManualClock::new();
        let manager = PluginManager::builder(quiet_config())
            .with_clock(Arc::new(clock.clone()))
            .build();
        manager
            .register("adder", Arc::new(Adder), PluginConfig::default())
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();

        clock.advance(Duration::from_secs(20));
        let out = manager
            .invoke_capability("math.add", json!({"a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(out, json!(5));

        let status = manager.status("adder").await.unwrap();
        assert_eq!(status.metrics.last_heartbeat, clock.now());
    }

    #[tokio::test]
    async fn test_failed_capability_counts_error() {
        let manager = PluginManager::builder(quiet_config()).build();
        manager
            .register("adder", Arc::new(Adder), PluginConfig::default())
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();

        let err = manager
            .invoke_capability("math.fail", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::PluginFailure { ref id, .. } if id == "adder"));
        assert_eq!(manager.status("adder").await.unwrap().metrics.error_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let manager = PluginManager::builder(quiet_config()).build();
        assert!(matches!(
            manager.invoke_capability("nope", Value::Null).await,
            Err(WardenError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_drops_capabilities() {
        let manager = PluginManager::builder(quiet_config()).build();
        manager
            .register("adder", Arc::new(Adder), PluginConfig::default())
            .await
            .unwrap();
        manager.initialize_all().await.unwrap();
        assert!(manager.remove("adder").await);
        assert!(!manager.remove("adder").await);
        assert!(manager.capabilities().names().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let manager = PluginManager::builder(ManagerConfig::default()).build();
        assert!(manager.monitor_running());
        manager.shutdown().await;
        assert!(!manager.monitor_running());
    }

    #[tokio::test]
    async fn test_monitor_disabled() {
        let manager = PluginManager::builder(quiet_config()).build();
        assert!(!manager.monitor_running());
    }

    #[test]
    fn test_build_outside_runtime_skips_monitor() {
        let manager = PluginManager::builder(ManagerConfig::default()).build();
        assert!(!manager.monitor_running());
    }
}
