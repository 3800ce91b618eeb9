//! Event dispatcher: fan-out from event type to subscriber callbacks.
//!
//! Callbacks are registered per event type and identified by `Arc` pointer,
//! so registering the same handler twice is a no-op. Every dispatched event
//! is also published on a broadcast tap for consumers that prefer a stream.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::events::{SocketEvent, SocketEventType};

/// A subscriber callback.
pub type EventHandler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&SocketEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn same_handler(a: &EventHandler, b: &EventHandler) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Subscription registry plus broadcast tap.
///
/// Cloning shares the registry. The registry is never cleared by the
/// connection manager, so subscriptions survive reconnects.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Arc<RwLock<HashMap<SocketEventType, Vec<EventHandler>>>>,
    sender: broadcast::Sender<SocketEvent>,
}

impl EventDispatcher {
    /// Create a new dispatcher; `capacity` bounds the broadcast tap.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            sender,
        }
    }

    /// Register `handler` for `event_type`. Idempotent per handler.
    pub fn on(&self, event_type: SocketEventType, handler: EventHandler) {
        let mut handlers = self.handlers.write();
        let set = handlers.entry(event_type).or_default();
        if !set.iter().any(|h| same_handler(h, &handler)) {
            set.push(handler);
        }
    }

    /// Remove `handler` from `event_type`. Unknown handlers are ignored.
    pub fn off(&self, event_type: &SocketEventType, handler: &EventHandler) {
        let mut handlers = self.handlers.write();
        if let Some(set) = handlers.get_mut(event_type) {
            set.retain(|h| !same_handler(h, handler));
            if set.is_empty() {
                handlers.remove(event_type);
            }
        }
    }

    /// Number of callbacks registered for `event_type`.
    pub fn handler_count(&self, event_type: &SocketEventType) -> usize {
        self.handlers
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Subscribe to every dispatched event as a stream.
    ///
    /// Slow consumers that fall behind receive `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every callback registered for its type, then to the tap.
    ///
    /// Callbacks run in registration order on the calling task. A panicking
    /// callback is logged and skipped. Returns the number of callbacks that
    /// completed.
    pub fn dispatch(&self, event: SocketEvent) -> usize {
        // Snapshot so callbacks may call on/off without deadlocking.
        let snapshot: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for h in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| h(&event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("handler for {} panicked: {reason}", event.event_type);
                }
            }
        }

        let event_type = event.event_type.to_string();
        match self.sender.send(event) {
            Ok(count) => debug!(
                "dispatched {event_type} to {delivered} handler(s), {count} stream subscriber(s)"
            ),
            Err(_) => debug!("dispatched {event_type} to {delivered} handler(s)"),
        }
        delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.handlers.read().len())
            .field("stream_subscribers", &self.sender.receiver_count())
            .finish()
    }
}
