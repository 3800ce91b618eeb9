//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use rt_socket::{
    handler, EventDispatcher, MemoryConnector, MemorySocket, SocketEvent, SocketEventType,
    SocketManager,
};

pub const ADDRESS: &str = "http://localhost:8000";

/// Create a manager with default tuning over an in-memory connector.
pub fn create_test_manager() -> (Arc<SocketManager>, MemoryConnector) {
    create_test_manager_with(|m| m)
}

/// Like [`create_test_manager`], with a hook to adjust the manager before sharing it.
pub fn create_test_manager_with(
    configure: impl FnOnce(SocketManager) -> SocketManager,
) -> (Arc<SocketManager>, MemoryConnector) {
    rt_core::logging::init_test_logging();
    let connector = MemoryConnector::new();
    let manager = SocketManager::new(ADDRESS, Arc::new(connector.clone()), EventDispatcher::new(64));
    (Arc::new(configure(manager)), connector)
}

/// Let spawned tasks (event pumps, timers) drain their queues.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Connect with `credential` and complete the handshake.
pub async fn open_connection(
    manager: &Arc<SocketManager>,
    connector: &MemoryConnector,
    credential: &str,
) -> MemorySocket {
    manager.connect(credential);
    let socket = connector.latest().expect("connect should construct a transport");
    socket.open();
    settle().await;
    socket
}

/// Record every event of `event_type` the manager dispatches.
pub fn record(
    manager: &SocketManager,
    event_type: impl Into<SocketEventType>,
) -> Arc<Mutex<Vec<SocketEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.on(event_type, handler(move |event| sink.lock().push(event.clone())));
    seen
}
