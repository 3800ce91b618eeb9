//! Per-consumer handle onto the shared connection.
//!
//! Each consumer (a view, a command, a worker) holds one [`SocketBinding`].
//! Bindings are counted explicitly: the connection is opened when a binding
//! has a credential and no live connection exists, and closed only when the
//! last binding is dropped (if the manager is configured to do so). Handlers
//! registered through a binding are removed when it drops.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::dispatcher::{same_handler, EventHandler};
use crate::events::{ConnectionState, SocketEventType};
use crate::manager::SocketManager;

impl SocketManager {
    /// Bind a new consumer, connecting with `credential` if no connection exists.
    pub fn bind(self: &Arc<Self>, credential: Option<&str>) -> SocketBinding {
        let count = self.bindings.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("socket binding acquired ({count} live)");
        let binding = SocketBinding {
            manager: Arc::clone(self),
            subscriptions: Mutex::new(Vec::new()),
        };
        binding.set_credential(credential);
        binding
    }

    /// Number of live bindings.
    pub fn active_bindings(&self) -> usize {
        self.bindings.load(Ordering::SeqCst)
    }
}

/// A consumer's handle onto the shared connection.
pub struct SocketBinding {
    manager: Arc<SocketManager>,
    subscriptions: Mutex<Vec<(SocketEventType, EventHandler)>>,
}

impl SocketBinding {
    /// Offer a credential. Connects only when it is non-empty and the
    /// connection is idle or closed.
    pub fn set_credential(&self, credential: Option<&str>) {
        let Some(credential) = credential.filter(|c| !c.is_empty()) else {
            return;
        };
        match self.manager.state() {
            ConnectionState::Idle | ConnectionState::Closed => self.manager.connect(credential),
            state => debug!("socket {state}, binding does not reconnect"),
        }
    }

    /// Forward to [`SocketManager::send`].
    pub fn send<T: Serialize>(&self, event_type: &str, data: T) -> bool {
        self.manager.send(event_type, data)
    }

    /// Register `handler` for `event_type` for the lifetime of this binding.
    pub fn on(&self, event_type: impl Into<SocketEventType>, handler: EventHandler) {
        let event_type = event_type.into();
        self.manager.on(event_type.clone(), handler.clone());
        self.subscriptions.lock().push((event_type, handler));
    }

    /// Remove `handler` from `event_type`.
    pub fn off(&self, event_type: impl Into<SocketEventType>, handler: &EventHandler) {
        let event_type = event_type.into();
        self.manager.off(event_type.clone(), handler);
        self.subscriptions
            .lock()
            .retain(|(t, h)| !(t == &event_type && same_handler(h, handler)));
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// The shared manager behind this binding.
    pub fn manager(&self) -> &Arc<SocketManager> {
        &self.manager
    }
}

impl Drop for SocketBinding {
    fn drop(&mut self) {
        for (event_type, handler) in self.subscriptions.lock().drain(..) {
            self.manager.off(event_type, &handler);
        }

        let remaining = self.manager.bindings.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("socket binding released ({remaining} live)");
        if remaining == 0 && self.manager.disconnect_when_unbound {
            self.manager.disconnect();
        }
    }
}

impl std::fmt::Debug for SocketBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketBinding")
            .field("state", &self.manager.state())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}
