//! Plugin registry: entries plus the dependency graph between them.
//!
//! The registry is plain in-memory bookkeeping. It is shared between the
//! caller driving initialization and the health monitor through a
//! [`SharedRegistry`] (`tokio::sync::RwLock`); every method here assumes the
//! caller already holds the lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Result, WardenError};

use super::resolver::DependencyGraph;
use super::traits::Plugin;
use super::types::{PluginConfig, PluginMetrics, PluginState, PluginStatus};

/// Registry handle shared between the manager, contexts and the monitor.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// One registered plugin.
pub struct PluginEntry {
    pub id: String,
    pub instance: Arc<dyn Plugin>,
    pub config: PluginConfig,
    pub is_initialized: bool,
    pub state: PluginState,
    pub metrics: PluginMetrics,
}

impl PluginEntry {
    pub fn status(&self) -> PluginStatus {
        PluginStatus {
            id: self.id.clone(),
            state: self.state,
            is_initialized: self.is_initialized,
            metadata: self.config.metadata.clone(),
            dependencies: self.config.dependencies.clone(),
            recovery_strategy: self.config.error_handling.recovery_strategy,
            metrics: self.metrics.clone(),
        }
    }
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("is_initialized", &self.is_initialized)
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Owns every [`PluginEntry`] and the [`DependencyGraph`] between them.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, PluginEntry>,
    graph: DependencyGraph,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh registry for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Register a plugin.
    ///
    /// # Errors
    ///
    /// - [`WardenError::DuplicateRegistration`] if `id` is taken
    /// - [`WardenError::InvalidConfiguration`] for malformed ids or settings
    pub fn register(
        &mut self,
        id: &str,
        instance: Arc<dyn Plugin>,
        config: PluginConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(WardenError::DuplicateRegistration(id.to_string()));
        }
        let config = config.normalize(id)?;

        info!(
            plugin = %id,
            version = config.metadata.version.as_deref().unwrap_or("unversioned"),
            description = config.metadata.description.as_deref().unwrap_or(""),
            dependencies = ?config.dependencies,
            "Registering plugin"
        );

        self.graph.add_node(id, config.dependencies.clone());
        self.entries.insert(
            id.to_string(),
            PluginEntry {
                id: id.to_string(),
                instance,
                config,
                is_initialized: false,
                state: PluginState::Registered,
                metrics: PluginMetrics::new(now),
            },
        );
        Ok(())
    }

    /// Remove a plugin and every edge touching it. Removing an absent id is
    /// a no-op returning `None`.
    pub fn remove(&mut self, id: &str) -> Option<PluginEntry> {
        let entry = self.entries.remove(id)?;
        let dependents = self.graph.dependents_of(id);
        if !dependents.is_empty() {
            warn!(
                plugin = %id,
                dependents = ?dependents,
                "Removed plugin was a dependency of other plugins"
            );
        }
        self.graph.remove_node(id);
        Some(entry)
    }

    pub fn get(&self, id: &str) -> Option<&PluginEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PluginEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.graph.nodes().to_vec()
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.graph
            .nodes()
            .iter()
            .filter_map(|id| self.entries.get(id))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Initialization order over the current graph.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        self.graph.resolve_order()
    }

    /// Refresh the heartbeat. Returns `false` for unknown ids.
    pub fn record_heartbeat(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.metrics.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    /// Increment the error counter, returning the new value.
    pub fn record_error(&mut self, id: &str) -> Option<u32> {
        self.entries.get_mut(id).map(|entry| {
            entry.metrics.error_count = entry.metrics.error_count.saturating_add(1);
            entry.metrics.error_count
        })
    }

    /// Increment the warning counter, returning the new value.
    pub fn record_warning(&mut self, id: &str) -> Option<u32> {
        self.entries.get_mut(id).map(|entry| {
            entry.metrics.warning_count = entry.metrics.warning_count.saturating_add(1);
            entry.metrics.warning_count
        })
    }

    pub fn status(&self, id: &str) -> Option<PluginStatus> {
        self.entries.get(id).map(PluginEntry::status)
    }

    /// Status of every plugin in registration order.
    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.entries().map(PluginEntry::status).collect()
    }
}
