//! Publish/subscribe registry for coordinator events.
//!
//! Any number of handlers may listen to the same event type; each gets a
//! `SubscriptionId` so it can be removed on its own.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::types::protocol::{EventType, ProcessEvent};

/// Callback invoked for every matching event, on the coordinator's control task.
/// Handlers must not block.
pub type EventHandler = Arc<dyn Fn(&ProcessEvent) + Send + Sync>;

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: HashMap<EventType, Vec<(SubscriptionId, EventHandler)>>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event_type: EventType, handler: EventHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers
            .entry(event_type)
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for handlers in self.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Removes every handler for `event_type`, returning how many were removed.
    pub fn clear(&mut self, event_type: EventType) -> usize {
        self.handlers
            .remove(&event_type)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.get(&event_type).map(Vec::len).unwrap_or(0)
    }

    /// Snapshot of the handlers for one type, so callers can release the lock
    /// before invoking them.
    pub fn handlers_for(&self, event_type: EventType) -> Vec<EventHandler> {
        self.handlers
            .get(&event_type)
            .map(|h| h.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Invokes every handler for the event's type. Returns the number invoked.
    pub fn dispatch(&self, event: &ProcessEvent) -> usize {
        invoke_all(&self.handlers_for(event.event_type()), event)
    }
}

/// Calls each handler in registration order; a panicking handler is logged and
/// does not stop the rest.
pub fn invoke_all(handlers: &[EventHandler], event: &ProcessEvent) -> usize {
    for handler in handlers {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
        if outcome.is_err() {
            error!(event_type = %event.event_type(), "event handler panicked");
        }
    }
    handlers.len()
}
