//! Ordered, retrying, timeout-bounded plugin startup.
//!
//! Each attempt races `Plugin::initialize` against the plugin's
//! `timeout_ms`. A timed-out attempt drops the in-flight future, so its
//! eventual outcome is discarded. Failed attempts are followed by a linear
//! backoff of `retry_backoff × attempt` before the next try. Capabilities
//! registered by a failed or timed-out attempt are dropped before the next
//! one, so each attempt starts from a clean capability set.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::bus::{EventBus, LifecycleEvent};
use crate::error::{Result, WardenError};
use crate::utils::clock::Clock;

use super::context::{CapabilityRegistry, PluginContext};
use super::registry::SharedRegistry;
use super::traits::Plugin;
use super::types::{ErrorHandling, PluginState};

/// Drives plugin initialization.
#[derive(Clone)]
pub struct Initializer {
    registry: SharedRegistry,
    capabilities: CapabilityRegistry,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    retry_backoff: Duration,
}

impl Initializer {
    pub fn new(
        registry: SharedRegistry,
        capabilities: CapabilityRegistry,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            registry,
            capabilities,
            bus,
            clock,
            retry_backoff,
        }
    }

    /// Initialize every registered plugin in dependency order.
    ///
    /// Plugins are started one at a time. Already-initialized plugins are
    /// skipped. The first plugin that exhausts its attempts aborts the call;
    /// plugins initialized before it stay initialized and later ones are not
    /// attempted.
    ///
    /// Returns the ids initialized by this call, in order.
    pub async fn initialize_all(&self) -> Result<Vec<String>> {
        let order = self.registry.read().await.resolve_order()?;
        info!(plugins = order.len(), order = ?order, "Initializing plugins");

        let mut initialized = Vec::with_capacity(order.len());
        for id in order {
            let already = self
                .registry
                .read()
                .await
                .get(&id)
                .map(|entry| entry.is_initialized);
            match already {
                Some(true) => {
                    debug!(plugin = %id, "Plugin already initialized, skipping");
                    continue;
                }
                Some(false) => {}
                None => {
                    debug!(plugin = %id, "Plugin removed before initialization, skipping");
                    continue;
                }
            }

            self.initialize_one(&id).await?;
            initialized.push(id);
        }

        info!(initialized = initialized.len(), "Plugin initialization complete");
        Ok(initialized)
    }

    /// Initialize a single plugin with retries.
    ///
    /// # Errors
    ///
    /// - [`WardenError::NotFound`] for unknown ids
    /// - [`WardenError::InitializationInProgress`] if the plugin is already
    ///   initializing or recovering
    /// - [`WardenError::PluginInitializationFailed`] once attempts run out
    pub async fn initialize_one(&self, id: &str) -> Result<()> {
        self.start(id, false).await
    }

    /// Re-initialize a plugin the recovery controller has already claimed.
    pub(crate) async fn reinitialize(&self, id: &str) -> Result<()> {
        self.start(id, true).await
    }

    async fn start(&self, id: &str, claimed_by_recovery: bool) -> Result<()> {
        let (instance, options, error_handling) = {
            let mut registry = self.registry.write().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| WardenError::NotFound(format!("plugin '{}'", id)))?;

            let allowed = match entry.state {
                PluginState::Initializing => false,
                PluginState::Recovering => claimed_by_recovery,
                _ => true,
            };
            if !allowed {
                return Err(WardenError::InitializationInProgress(id.to_string()));
            }

            entry.state = PluginState::Initializing;
            (
                Arc::clone(&entry.instance),
                entry.config.options.clone(),
                entry.config.error_handling.clone(),
            )
        };

        self.run_attempts(id, instance, options, error_handling).await
    }

    async fn run_attempts(
        &self,
        id: &str,
        instance: Arc<dyn Plugin>,
        options: Value,
        error_handling: ErrorHandling,
    ) -> Result<()> {
        let ctx = PluginContext::new(
            id,
            self.capabilities.clone(),
            self.bus.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
        );
        let max_attempts = error_handling.retry_attempts.max(1);
        let timeout = Duration::from_millis(error_handling.timeout_ms);

        let mut attempt: u32 = 0;
        let last_error = loop {
            attempt += 1;
            debug!(plugin = %id, attempt, max_attempts, "Initializing plugin");

            let outcome = match tokio::time::timeout(timeout, instance.initialize(&ctx, &options))
                .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(WardenError::PluginFailure {
                    id: id.to_string(),
                    source,
                }),
                Err(_) => Err(WardenError::InitializationTimeout {
                    id: id.to_string(),
                    timeout_ms: error_handling.timeout_ms,
                }),
            };

            match outcome {
                Ok(()) => {
                    self.mark_initialized(id, attempt).await;
                    return Ok(());
                }
                Err(err) => {
                    let error_count = self.registry.write().await.record_error(id);
                    // the failed or dropped attempt may have registered some
                    let dropped = self.capabilities.unregister_owner(id);
                    if !dropped.is_empty() {
                        debug!(plugin = %id, capabilities = ?dropped, "Dropped capabilities of failed attempt");
                    }
                    error!(
                        plugin = %id,
                        attempt,
                        max_attempts,
                        error_count = error_count.unwrap_or_default(),
                        error = %err,
                        "Plugin initialization attempt failed"
                    );
                    if attempt >= max_attempts {
                        break err;
                    }
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
            }
        };

        if let Some(entry) = self.registry.write().await.get_mut(id) {
            entry.state = PluginState::FailedInit;
            entry.is_initialized = false;
        }
        self.bus.publish(&LifecycleEvent::InitFailed {
            id: id.to_string(),
            attempts: attempt,
            error: last_error.to_string(),
        });

        Err(WardenError::PluginInitializationFailed {
            id: id.to_string(),
            attempts: attempt,
            source: Box::new(last_error),
        })
    }

    async fn mark_initialized(&self, id: &str, attempts: u32) {
        let now = self.clock.now();
        {
            let mut registry = self.registry.write().await;
            let Some(entry) = registry.get_mut(id) else {
                info!(plugin = %id, "Plugin initialized after it was removed; ignoring");
                return;
            };
            entry.is_initialized = true;
            entry.state = PluginState::Initialized;
            entry.metrics.last_heartbeat = now;
        }
        info!(plugin = %id, attempts, "Plugin initialized");
        self.bus.publish(&LifecycleEvent::Initialized {
            id: id.to_string(),
            attempts,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::registry::Registry;
    use crate::plugins::types::PluginConfig;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
            })
        }
    }

    #[async_trait]
    impl Plugin for Flaky {
        async fn initialize(&self, _ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                anyhow::bail!("attempt {} failed", n);
            }
            Ok(())
        }
    }

    /// Records its id into a shared log when initialized.
    struct Recorder {
        id: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Plugin for Recorder {
        async fn initialize(&self, _ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl Plugin for Slow {
        async fn initialize(&self, _ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    /// Registers `svc.ping`, then fails (or hangs past the timeout) on the
    /// first call.
    struct HalfStarted {
        calls: AtomicU32,
        hang: bool,
    }

    impl HalfStarted {
        fn new(hang: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                hang,
            })
        }
    }

    #[async_trait]
    impl Plugin for HalfStarted {
        async fn initialize(&self, ctx: &PluginContext, _options: &Value) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.register_capability("svc.ping", |_| async {
                Ok::<Value, anyhow::Error>(Value::from("pong"))
            })?;
            if n == 1 {
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                anyhow::bail!("dependency socket not ready");
            }
            Ok(())
        }
    }

    struct OptionsCheck;

    #[async_trait]
    impl Plugin for OptionsCheck {
        async fn initialize(&self, _ctx: &PluginContext, options: &Value) -> anyhow::Result<()> {
            anyhow::ensure!(options["rpc_url"] == "http://localhost:8545", "bad options");
            Ok(())
        }
    }

    fn initializer(registry: &SharedRegistry) -> Initializer {
        initializer_with(registry, CapabilityRegistry::new())
    }

    fn initializer_with(registry: &SharedRegistry, capabilities: CapabilityRegistry) -> Initializer {
        Initializer::new(
            Arc::clone(registry),
            capabilities,
            EventBus::new(),
            Arc::new(ManualClock::new()),
            Duration::from_millis(1),
        )
    }

    async fn register(
        registry: &SharedRegistry,
        id: &str,
        plugin: Arc<dyn Plugin>,
        config: PluginConfig,
    ) {
        registry
            .write()
            .await
            .register(id, plugin, config, chrono::Utc::now())
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let registry = Registry::shared();
        let plugin = Flaky::new(2);
        register(&registry, "wallet", plugin.clone(), PluginConfig::default()).await;

        initializer(&registry).initialize_one("wallet").await.unwrap();

        assert_eq!(plugin.calls.load(Ordering::SeqCst), 3);
        let reg = registry.read().await;
        let entry = reg.get("wallet").unwrap();
        assert!(entry.is_initialized);
        assert_eq!(entry.state, PluginState::Initialized);
        assert_eq!(entry.metrics.error_count, 2);
    }

    #[tokio::test]
    async fn test_retry_after_partial_capability_registration() {
        for hang in [false, true] {
            let registry = Registry::shared();
            let capabilities = CapabilityRegistry::new();
            let plugin = HalfStarted::new(hang);
            register(
                &registry,
                "svc",
                plugin.clone(),
                PluginConfig::default().with_timeout_ms(50),
            )
            .await;

            initializer_with(&registry, capabilities.clone())
                .initialize_one("svc")
                .await
                .unwrap();

            assert_eq!(plugin.calls.load(Ordering::SeqCst), 2, "hang={hang}");
            let (owner, handler) = capabilities.get("svc.ping").unwrap();
            assert_eq!(owner, "svc");
            assert_eq!(handler(Value::Null).await.unwrap(), "pong");
            assert!(registry.read().await.get("svc").unwrap().is_initialized);
        }
    }

    #[tokio::test]
    async fn test_exhausted_attempts_leave_no_capabilities() {
        let registry = Registry::shared();
        let capabilities = CapabilityRegistry::new();
        register(
            &registry,
            "svc",
            HalfStarted::new(false),
            PluginConfig::default().with_retry_attempts(1),
        )
        .await;

        initializer_with(&registry, capabilities.clone())
            .initialize_one("svc")
            .await
            .unwrap_err();
        assert!(capabilities.names().is_empty());
        assert_eq!(
            registry.read().await.get("svc").unwrap().state,
            PluginState::FailedInit
        );
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let registry = Registry::shared();
        let plugin = Flaky::new(u32::MAX);
        register(&registry, "wallet", plugin.clone(), PluginConfig::default()).await;

        let err = initializer(&registry)
            .initialize_one("wallet")
            .await
            .unwrap_err();

        assert_eq!(plugin.calls.load(Ordering::SeqCst), 3);
        match &err {
            WardenError::PluginInitializationFailed {
                id,
                attempts,
                source,
            } => {
                assert_eq!(id, "wallet");
                assert_eq!(*attempts, 3);
                assert!(matches!(**source, WardenError::PluginFailure { .. }));
                assert!(source.to_string().contains("attempt 3 failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let reg = registry.read().await;
        let entry = reg.get("wallet").unwrap();
        assert!(!entry.is_initialized);
        assert_eq!(entry.state, PluginState::FailedInit);
        assert_eq!(entry.metrics.error_count, 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let registry = Registry::shared();
        register(
            &registry,
            "slow",
            Arc::new(Slow),
            PluginConfig::default()
                .with_retry_attempts(2)
                .with_timeout_ms(20),
        )
        .await;

        let err = initializer(&registry)
            .initialize_one("slow")
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), Some(2));
        match err {
            WardenError::PluginInitializationFailed { source, .. } => {
                assert!(matches!(
                    *source,
                    WardenError::InitializationTimeout { timeout_ms: 20, .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_options_are_passed() {
        let registry = Registry::shared();
        register(
            &registry,
            "wallet",
            Arc::new(OptionsCheck),
            PluginConfig::default()
                .with_retry_attempts(1)
                .with_options(serde_json::json!({"rpc_url": "http://localhost:8545"})),
        )
        .await;
        initializer(&registry).initialize_one("wallet").await.unwrap();
    }

    #[tokio::test]
    async fn test_chain_initializes_dependencies_first() {
        let registry = Registry::shared();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (id, dep) in [("a", Some("b")), ("b", Some("c")), ("c", None)] {
            let mut config = PluginConfig::default();
            if let Some(dep) = dep {
                config = config.depends_on(dep);
            }
            let plugin = Arc::new(Recorder {
                id,
                log: Arc::clone(&log),
            });
            register(&registry, id, plugin, config).await;
        }

        let initialized = initializer(&registry).initialize_all().await.unwrap();
        assert_eq!(initialized, vec!["c", "b", "a"]);
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_plugins() {
        let registry = Registry::shared();
        let log = Arc::new(Mutex::new(Vec::new()));
        register(
            &registry,
            "base",
            Arc::new(Recorder {
                id: "base",
                log: Arc::clone(&log),
            }),
            PluginConfig::default(),
        )
        .await;
        register(
            &registry,
            "broken",
            Flaky::new(u32::MAX),
            PluginConfig::default().depends_on("base").with_retry_attempts(1),
        )
        .await;
        register(
            &registry,
            "top",
            Arc::new(Recorder {
                id: "top",
                log: Arc::clone(&log),
            }),
            PluginConfig::default().depends_on("broken"),
        )
        .await;

        let err = initializer(&registry).initialize_all().await.unwrap_err();
        assert!(matches!(err, WardenError::PluginInitializationFailed { .. }));
        assert_eq!(*log.lock().unwrap(), vec!["base"]);

        let reg = registry.read().await;
        assert!(reg.get("base").unwrap().is_initialized);
        assert_eq!(reg.get("top").unwrap().state, PluginState::Registered);
    }

    #[tokio::test]
    async fn test_initialize_all_skips_initialized() {
        let registry = Registry::shared();
        let plugin = Flaky::new(0);
        register(&registry, "wallet", plugin.clone(), PluginConfig::default()).await;

        let init = initializer(&registry);
        assert_eq!(init.initialize_all().await.unwrap(), vec!["wallet"]);
        assert!(init.initialize_all().await.unwrap().is_empty());
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initialize_all_propagates_graph_errors() {
        let registry = Registry::shared();
        register(
            &registry,
            "trader",
            Flaky::new(0),
            PluginConfig::default().depends_on("wallet"),
        )
        .await;
        let err = initializer(&registry).initialize_all().await.unwrap_err();
        assert!(matches!(err, WardenError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let registry = Registry::shared();
        let err = initializer(&registry)
            .initialize_one("ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_initialization_rejected() {
        let registry = Registry::shared();
        register(&registry, "wallet", Flaky::new(0), PluginConfig::default()).await;
        registry.write().await.get_mut("wallet").unwrap().state = PluginState::Initializing;

        let err = initializer(&registry)
            .initialize_one("wallet")
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InitializationInProgress(_)));
    }

    #[tokio::test]
    async fn test_success_refreshes_heartbeat() {
        let registry = Registry::shared();
        let clock = ManualClock::new();
        registry
            .write()
            .await
            .register("wallet", Flaky::new(0), PluginConfig::default(), clock.now())
            .unwrap();
        clock.advance(Duration::from_secs(60));

        let init = Initializer::new(
            Arc::clone(&registry),
            CapabilityRegistry::new(),
            EventBus::new(),
            Arc::new(clock.clone()),
            Duration::from_millis(1),
        );
        init.initialize_one("wallet").await.unwrap();

        let reg = registry.read().await;
        assert_eq!(reg.get("wallet").unwrap().metrics.last_heartbeat, clock.now());
    }
}
