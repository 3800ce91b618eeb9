//! Realtime socket client for the dashboard's event stream.
//!
//! This crate provides the connection manager that handles:
//! - One shared WebSocket per manager, opened with an opaque credential
//! - Heartbeat pings while open, with an optional pong watchdog
//! - Automatic reconnection with capped exponential backoff
//! - Forced-disconnect ("kick") handling that suppresses reconnection
//! - Per-event-type subscriber callbacks plus a broadcast tap
//! - Per-consumer bindings with explicit reference counting

pub mod backoff;
pub mod binding;
pub mod dispatcher;
pub mod events;
pub mod frame;
pub mod heartbeat;
pub mod manager;
pub mod transport;

// Re-export key types
pub use backoff::{ReconnectConfig, ReconnectScheduler};
pub use binding::SocketBinding;
pub use dispatcher::{handler, EventDispatcher, EventHandler};
pub use events::{
    ConnectionState, SocketEvent, SocketEventType,
    DisconnectedPayload, KickPayload, ImAckPayload, ImErrorPayload, StatusChangePayload,
};
pub use frame::Frame;
pub use heartbeat::HealthCheckConfig;
pub use manager::SocketManager;
pub use transport::{Connector, MemoryConnector, MemorySocket, Transport, TransportEvent, WsConnector};
