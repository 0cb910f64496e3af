//! Lifecycle events published by the plugin manager.

use serde::{Deserialize, Serialize};

use crate::plugins::types::{PluginState, RecoveryStrategy};

pub const PLUGIN_REGISTERED: &str = "plugin.registered";
pub const PLUGIN_INITIALIZED: &str = "plugin.initialized";
pub const PLUGIN_INIT_FAILED: &str = "plugin.init_failed";
pub const PLUGIN_HEARTBEAT_STALE: &str = "plugin.heartbeat_stale";
pub const PLUGIN_RECOVERING: &str = "plugin.recovering";
pub const PLUGIN_FAILOVER: &str = "plugin.failover";
pub const PLUGIN_TERMINATED: &str = "plugin.terminated";

/// A state change worth telling other components about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered {
        id: String,
        dependencies: Vec<String>,
    },
    Initialized {
        id: String,
        attempts: u32,
    },
    InitFailed {
        id: String,
        attempts: u32,
        error: String,
    },
    HeartbeatStale {
        id: String,
        elapsed_ms: u64,
    },
    Recovering {
        id: String,
        strategy: RecoveryStrategy,
        error_count: u32,
    },
    Failover {
        id: String,
        success: bool,
    },
    Terminated {
        id: String,
        previous_state: PluginState,
    },
}

impl LifecycleEvent {
    /// Bus event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Registered { .. } => PLUGIN_REGISTERED,
            LifecycleEvent::Initialized { .. } => PLUGIN_INITIALIZED,
            LifecycleEvent::InitFailed { .. } => PLUGIN_INIT_FAILED,
            LifecycleEvent::HeartbeatStale { .. } => PLUGIN_HEARTBEAT_STALE,
            LifecycleEvent::Recovering { .. } => PLUGIN_RECOVERING,
            LifecycleEvent::Failover { .. } => PLUGIN_FAILOVER,
            LifecycleEvent::Terminated { .. } => PLUGIN_TERMINATED,
        }
    }

    /// Plugin the event refers to.
    pub fn plugin_id(&self) -> &str {
        match self {
            LifecycleEvent::Registered { id, .. }
            | LifecycleEvent::Initialized { id, .. }
            | LifecycleEvent::InitFailed { id, .. }
            | LifecycleEvent::HeartbeatStale { id, .. }
            | LifecycleEvent::Recovering { id, .. }
            | LifecycleEvent::Failover { id, .. }
            | LifecycleEvent::Terminated { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let ev = LifecycleEvent::Initialized {
            id: "wallet".into(),
            attempts: 1,
        };
        assert_eq!(ev.name(), PLUGIN_INITIALIZED);
        assert_eq!(ev.plugin_id(), "wallet");
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let ev = LifecycleEvent::Terminated {
            id: "oracle".into(),
            previous_state: PluginState::Initialized,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "terminated");
        assert_eq!(json["id"], "oracle");
        assert_eq!(json["previous_state"], "initialized");
    }
}
