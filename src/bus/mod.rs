//! Event Bus Module
//!
//! A small in-process publish/subscribe bus. Plugins reach it through their
//! [`PluginContext`](crate::plugins::PluginContext); the manager publishes
//! [`LifecycleEvent`]s on it.
//!
//! Handlers run synchronously on the emitting task, in subscription order.
//! The handler list is cloned before dispatch, so a handler may call
//! [`EventBus::on`] or [`EventBus::off`] without deadlocking.
//!
//! # Example
//!
//! ```
//! use plugwarden::bus::EventBus;
//! use serde_json::json;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! let id = bus.on("price.updated", move |_payload| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! assert_eq!(bus.emit("price.updated", &json!({"pair": "ETH/USDC"})), 1);
//! assert!(bus.off("price.updated", id));
//! assert_eq!(bus.emit("price.updated", &json!({})), 0);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

pub mod event;

pub use event::LifecycleEvent;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{trace, warn};
use uuid::Uuid;

/// Callback invoked with an event payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// In-process event bus keyed by event name.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(event = %event, "Event handler subscribed");
        id
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Deliver `payload` to every handler of `event`. Returns the number of
    /// handlers invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let targets: Vec<EventHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(event) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };
        for handler in &targets {
            handler(payload);
        }
        targets.len()
    }

    /// Publish a lifecycle event under its well-known name.
    pub fn publish(&self, event: &LifecycleEvent) -> usize {
        match serde_json::to_value(event) {
            Ok(payload) => self.emit(event.name(), &payload),
            Err(e) => {
                warn!(event = event.name(), error = %e, "Failed to serialize lifecycle event");
                0
            }
        }
    }

    /// Number of handlers currently subscribed to `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("events", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
