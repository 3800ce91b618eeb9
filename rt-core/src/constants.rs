//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "rtlink";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// REST/WebSocket API version prefix.
pub const API_VERSION: &str = "v1";

/// Path of the realtime endpoint on the dashboard host.
pub const WS_CONNECT_PATH: &str = "/api/v1/ws/connect";

/// Query parameter carrying the credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// WebSocket close code for an explicit, normal close. Suppresses reconnection.
pub const CLOSE_NORMAL: u16 = 1000;

/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default first reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Default reconnect delay ceiling in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Default transport connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the event broadcast tap.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Frame `type` strings with a meaning to the connection manager itself.
pub mod frame_types {
    /// Outbound heartbeat.
    pub const PING: &str = "ping";
    /// Heartbeat reply. Consumed, never dispatched.
    pub const PONG: &str = "pong";
    /// Server-initiated forced disconnect.
    pub const KICK: &str = "sys.kick";
    /// Local notification: the transport opened.
    pub const CONNECTED: &str = "ws.connected";
    /// Local notification: the transport closed.
    pub const DISCONNECTED: &str = "ws.disconnected";

    /// Application event types emitted by the dashboard backend.
    pub const IM_MESSAGE: &str = "im.message";
    pub const IM_ACK: &str = "im.ack";
    pub const IM_ERROR: &str = "im.error";
    pub const STATUS_CHANGE: &str = "status.change";
    pub const SCREEN_V1_UPDATE: &str = "screen.v1.update";
    pub const SCREEN_V2_UPDATE: &str = "screen.v2.update";
    pub const SCREEN_RANKING_UPDATE: &str = "screen.ranking.update";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_path_uses_api_version() {
        assert!(WS_CONNECT_PATH.contains(API_VERSION));
    }

    #[test]
    fn test_backoff_defaults_are_ordered() {
        assert!(DEFAULT_RECONNECT_BASE_DELAY_MS < DEFAULT_RECONNECT_MAX_DELAY_MS);
    }
}
