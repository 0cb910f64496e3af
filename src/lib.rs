//! Plugwarden - plugin lifecycle orchestration
//!
//! Register independently implemented plugins, start them in dependency
//! order, watch their health and recover them when they misbehave.

pub mod bus;
pub mod config;
pub mod error;
pub mod plugins;
pub mod utils;

pub use bus::{EventBus, LifecycleEvent};
pub use config::Config;
pub use error::{Result, WardenError};
pub use plugins::{
    FailoverHook, Plugin, PluginConfig, PluginContext, PluginManager, PluginState, PluginStatus,
    RecoveryStrategy,
};
