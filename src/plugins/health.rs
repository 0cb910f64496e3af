//! Periodic plugin health checks.
//!
//! Every tick the monitor looks at each registered plugin once:
//! a heartbeat older than the timeout produces one warning, and an error
//! count above the threshold hands the plugin to the [`RecoveryController`].
//! The monitor itself never touches `last_heartbeat` or `error_count`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, LifecycleEvent};
use crate::config::ManagerConfig;
use crate::utils::clock::{elapsed_ms, Clock};

use super::recovery::{RecoveryController, RecoveryOutcome};
use super::registry::SharedRegistry;

/// Findings of a single health pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Plugins whose heartbeat is older than the timeout, with the elapsed ms.
    pub stale: Vec<(String, u64)>,
    /// Plugins whose error count exceeds the threshold.
    pub failing: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.stale.is_empty() && self.failing.is_empty()
    }
}

/// Heartbeat and error-count watchdog.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: SharedRegistry,
    recovery: RecoveryController,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    interval: Duration,
    heartbeat_timeout_ms: u64,
    error_threshold: u32,
}

impl HealthMonitor {
    pub fn new(
        registry: SharedRegistry,
        recovery: RecoveryController,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            registry,
            recovery,
            bus,
            clock,
            interval: Duration::from_millis(config.health_check_interval_ms.max(1)),
            heartbeat_timeout_ms: config.heartbeat_timeout_ms,
            error_threshold: config.error_threshold,
        }
    }

    /// Inspect every plugin without running recovery.
    ///
    /// Stale plugins get a warning log, a `warning_count` bump and a
    /// `plugin.heartbeat_stale` event. Busy plugins, and plugins whose last
    /// restart failed, are never reported as failing.
    pub async fn check(&self) -> HealthReport {
        let now = self.clock.now();
        let mut report = HealthReport::default();
        {
            let mut registry = self.registry.write().await;
            for id in registry.ids() {
                let Some(entry) = registry.get_mut(&id) else {
                    continue;
                };
                let elapsed = elapsed_ms(entry.metrics.last_heartbeat, now);
                if elapsed > self.heartbeat_timeout_ms {
                    entry.metrics.warning_count = entry.metrics.warning_count.saturating_add(1);
                    warn!(
                        plugin = %id,
                        elapsed_ms = elapsed,
                        timeout_ms = self.heartbeat_timeout_ms,
                        "Plugin heartbeat timed out"
                    );
                    report.stale.push((id.clone(), elapsed));
                }
                if entry.metrics.error_count > self.error_threshold
                    && entry.state.accepts_recovery()
                {
                    report.failing.push(id);
                }
            }
        }

        for (id, elapsed_ms) in &report.stale {
            self.bus.publish(&LifecycleEvent::HeartbeatStale {
                id: id.clone(),
                elapsed_ms: *elapsed_ms,
            });
        }
        report
    }

    /// One full monitor pass: check, then recover every failing plugin in
    /// turn.
    pub async fn tick(&self) -> (HealthReport, Vec<(String, RecoveryOutcome)>) {
        let report = self.check().await;
        let mut outcomes = Vec::with_capacity(report.failing.len());
        for id in &report.failing {
            let outcome = self.recovery.handle_failure(id).await;
            debug!(plugin = %id, outcome = ?outcome, "Recovery finished");
            outcomes.push((id.clone(), outcome));
        }
        (report, outcomes)
    }

    /// Run [`tick`](Self::tick) every interval until `shutdown_rx` flips to
    /// `true`.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                heartbeat_timeout_ms = self.heartbeat_timeout_ms,
                error_threshold = self.error_threshold,
                "Health monitor started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Health monitor stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
