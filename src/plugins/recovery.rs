//! Recovery strategies for failing plugins.
//!
//! Nothing in here escalates: restart, failover and termination failures are
//! logged and reported through [`RecoveryOutcome`], and the manager keeps
//! running. A failed termination leaves the plugin registered so it can be
//! retried later.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, LifecycleEvent};
use crate::error::{Result, WardenError};

use super::context::CapabilityRegistry;
use super::initializer::Initializer;
use super::registry::SharedRegistry;
use super::traits::FailoverHook;
use super::types::{PluginState, RecoveryStrategy};

/// What a recovery action ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Unknown plugin, or it was already initializing/recovering.
    Skipped,
    Restarted,
    RestartFailed,
    FailoverInvoked,
    FailoverFailed,
    Terminated,
    TerminationFailed,
}

/// Dispatches the configured [`RecoveryStrategy`] for a plugin.
#[derive(Clone)]
pub struct RecoveryController {
    registry: SharedRegistry,
    initializer: Initializer,
    capabilities: CapabilityRegistry,
    bus: EventBus,
    failover: Arc<dyn FailoverHook>,
}

impl RecoveryController {
    pub fn new(
        registry: SharedRegistry,
        initializer: Initializer,
        capabilities: CapabilityRegistry,
        bus: EventBus,
        failover: Arc<dyn FailoverHook>,
    ) -> Self {
        Self {
            registry,
            initializer,
            capabilities,
            bus,
            failover,
        }
    }

    /// Apply the plugin's recovery strategy.
    ///
    /// Skipped when the plugin is unknown or already initializing or
    /// recovering, so the monitor never races an in-flight startup.
    pub async fn handle_failure(&self, id: &str) -> RecoveryOutcome {
        let (strategy, previous, error_count) = {
            let mut registry = self.registry.write().await;
            let Some(entry) = registry.get_mut(id) else {
                debug!(plugin = %id, "Recovery requested for unknown plugin");
                return RecoveryOutcome::Skipped;
            };
            if entry.state.is_busy() {
                debug!(plugin = %id, state = %entry.state, "Plugin busy, deferring recovery");
                return RecoveryOutcome::Skipped;
            }
            let previous = entry.state;
            entry.state = PluginState::Recovering;
            (
                entry.config.error_handling.recovery_strategy,
                previous,
                entry.metrics.error_count,
            )
        };

        warn!(
            plugin = %id,
            strategy = strategy.as_str(),
            error_count,
            "Recovering plugin"
        );
        self.bus.publish(&LifecycleEvent::Recovering {
            id: id.to_string(),
            strategy,
            error_count,
        });

        match strategy {
            RecoveryStrategy::Restart => match self.restart_claimed(id).await {
                Ok(()) => RecoveryOutcome::Restarted,
                Err(e) => {
                    error!(plugin = %id, error = %e, "Plugin restart failed");
                    RecoveryOutcome::RestartFailed
                }
            },
            RecoveryStrategy::Failover => self.run_failover(id, previous).await,
            RecoveryStrategy::Terminate => {
                if self.terminate_from(id, Some(previous)).await {
                    RecoveryOutcome::Terminated
                } else {
                    RecoveryOutcome::TerminationFailed
                }
            }
        }
    }

    /// Destroy and re-initialize a plugin.
    ///
    /// # Errors
    ///
    /// [`WardenError::InitializationInProgress`] if the plugin is busy, plus
    /// any error from re-initialization.
    pub async fn restart(&self, id: &str) -> Result<()> {
        {
            let mut registry = self.registry.write().await;
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| WardenError::NotFound(format!("plugin '{}'", id)))?;
            if entry.state.is_busy() {
                return Err(WardenError::InitializationInProgress(id.to_string()));
            }
            entry.state = PluginState::Recovering;
        }
        self.restart_claimed(id).await
    }

    async fn restart_claimed(&self, id: &str) -> Result<()> {
        let instance = {
            let registry = self.registry.read().await;
            let entry = registry
                .get(id)
                .ok_or_else(|| WardenError::NotFound(format!("plugin '{}'", id)))?;
            Arc::clone(&entry.instance)
        };

        if let Err(source) = instance.destroy().await {
            let err = WardenError::TerminationFailure {
                id: id.to_string(),
                source,
            };
            warn!(plugin = %id, error = %err, "Destroy failed during restart; continuing");
        }
        self.capabilities.unregister_owner(id);

        if let Some(entry) = self.registry.write().await.get_mut(id) {
            entry.is_initialized = false;
        }

        info!(plugin = %id, "Restarting plugin");
        if let Err(e) = self.initializer.reinitialize(id).await {
            if let Some(entry) = self.registry.write().await.get_mut(id) {
                entry.state = PluginState::RecoveryFailed;
            }
            return Err(e);
        }

        if let Some(entry) = self.registry.write().await.get_mut(id) {
            entry.metrics.error_count = 0;
        }
        Ok(())
    }

    async fn run_failover(&self, id: &str, previous: PluginState) -> RecoveryOutcome {
        match self.failover.failover(id).await {
            Ok(()) => {
                if let Some(entry) = self.registry.write().await.get_mut(id) {
                    entry.state = PluginState::FailoverInvoked;
                    entry.metrics.error_count = 0;
                }
                info!(plugin = %id, "Failover invoked");
                self.bus.publish(&LifecycleEvent::Failover {
                    id: id.to_string(),
                    success: true,
                });
                RecoveryOutcome::FailoverInvoked
            }
            Err(source) => {
                let err = WardenError::FailoverFailure {
                    id: id.to_string(),
                    source,
                };
                error!(plugin = %id, error = %err, "Failover failed");
                self.restore_state(id, previous).await;
                self.bus.publish(&LifecycleEvent::Failover {
                    id: id.to_string(),
                    success: false,
                });
                RecoveryOutcome::FailoverFailed
            }
        }
    }

    /// Destroy and unregister a plugin.
    ///
    /// The entry, its dependency edges and its capabilities are removed only
    /// if `destroy()` succeeds. On failure the error is logged and the plugin
    /// stays registered. Returns `true` if the plugin was removed.
    pub async fn terminate(&self, id: &str) -> bool {
        self.terminate_from(id, None).await
    }

    async fn terminate_from(&self, id: &str, restore: Option<PluginState>) -> bool {
        let (instance, state) = {
            let registry = self.registry.read().await;
            let Some(entry) = registry.get(id) else {
                debug!(plugin = %id, "Terminate requested for unknown plugin");
                return false;
            };
            (Arc::clone(&entry.instance), restore.unwrap_or(entry.state))
        };

        match instance.destroy().await {
            Ok(()) => {
                let removed = self.registry.write().await.remove(id);
                let capabilities = self.capabilities.unregister_owner(id);
                if let Some(mut entry) = removed {
                    entry.state = PluginState::Terminated;
                    entry.is_initialized = false;
                    debug!(plugin = %id, status = ?entry.status(), "Final plugin status");
                }
                info!(plugin = %id, capabilities = ?capabilities, "Plugin terminated");
                self.bus.publish(&LifecycleEvent::Terminated {
                    id: id.to_string(),
                    previous_state: state,
                });
                true
            }
            Err(source) => {
                let err = WardenError::TerminationFailure {
                    id: id.to_string(),
                    source,
                };
                error!(plugin = %id, error = %err, "Plugin termination failed; keeping it registered");
                if let Some(previous) = restore {
                    self.restore_state(id, previous).await;
                }
                false
            }
        }
    }

    async fn restore_state(&self, id: &str, state: PluginState) {
        if let Some(entry) = self.registry.write().await.get_mut(id) {
            entry.state = state;
        }
    }
}
