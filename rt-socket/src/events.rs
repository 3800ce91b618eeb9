//! Event types dispatched to subscribers.
//!
//! Known event types are named variants with typed payload accessors;
//! anything else the server sends passes through as `Custom`.

use serde::{Deserialize, Serialize};

use rt_core::constants::frame_types;

use crate::frame::Frame;

/// Event types routed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketEventType {
    /// The transport opened (`ws.connected`). Local notification.
    Connected,
    /// The transport closed (`ws.disconnected`). Local notification.
    Disconnected,
    /// The server forced this client off (`sys.kick`).
    Kick,
    /// Heartbeat reply (`pong`). Never dispatched.
    Pong,
    /// A chat message forwarded by the server (`im.message`).
    ImMessage,
    /// Delivery receipt for a message this client sent (`im.ack`).
    ImAck,
    /// The server rejected a message this client sent (`im.error`).
    ImError,
    /// A user went online or offline (`status.change`).
    StatusChange,
    /// Big-screen dashboard refresh (`screen.v1.update`).
    ScreenV1Update,
    /// Big-screen dashboard refresh (`screen.v2.update`).
    ScreenV2Update,
    /// Big-screen ranking refresh (`screen.ranking.update`).
    ScreenRankingUpdate,
    /// Any other application event, keyed by its exact type string.
    Custom(String),
}

impl SocketEventType {
    /// Parse a frame type string.
    pub fn from_str(s: &str) -> Self {
        match s {
            frame_types::CONNECTED => Self::Connected,
            frame_types::DISCONNECTED => Self::Disconnected,
            frame_types::KICK => Self::Kick,
            frame_types::PONG => Self::Pong,
            frame_types::IM_MESSAGE => Self::ImMessage,
            frame_types::IM_ACK => Self::ImAck,
            frame_types::IM_ERROR => Self::ImError,
            frame_types::STATUS_CHANGE => Self::StatusChange,
            frame_types::SCREEN_V1_UPDATE => Self::ScreenV1Update,
            frame_types::SCREEN_V2_UPDATE => Self::ScreenV2Update,
            frame_types::SCREEN_RANKING_UPDATE => Self::ScreenRankingUpdate,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Convert back to the wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => frame_types::CONNECTED,
            Self::Disconnected => frame_types::DISCONNECTED,
            Self::Kick => frame_types::KICK,
            Self::Pong => frame_types::PONG,
            Self::ImMessage => frame_types::IM_MESSAGE,
            Self::ImAck => frame_types::IM_ACK,
            Self::ImError => frame_types::IM_ERROR,
            Self::StatusChange => frame_types::STATUS_CHANGE,
            Self::ScreenV1Update => frame_types::SCREEN_V1_UPDATE,
            Self::ScreenV2Update => frame_types::SCREEN_V2_UPDATE,
            Self::ScreenRankingUpdate => frame_types::SCREEN_RANKING_UPDATE,
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Whether the connection manager synthesizes this event itself.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }

    /// Whether this event type relates to chat messages.
    pub fn is_im_event(&self) -> bool {
        matches!(self, Self::ImMessage | Self::ImAck | Self::ImError)
    }

    /// Whether this event type refreshes a big-screen dashboard.
    pub fn is_screen_event(&self) -> bool {
        matches!(
            self,
            Self::ScreenV1Update | Self::ScreenV2Update | Self::ScreenRankingUpdate
        )
    }
}

impl std::fmt::Display for SocketEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SocketEventType {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

/// Payload of a `ws.disconnected` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectedPayload {
    /// Close code reported by the transport, if any.
    pub code: Option<u16>,
}

/// Payload of a `sys.kick` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickPayload {
    /// Human-readable reason, e.g. "logged_in_elsewhere".
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of an inbound `im.message` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImMessagePayload {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    /// Content type: "text", "image", "file".
    #[serde(rename = "type", default)]
    pub content_type: String,
    pub content: String,
    /// Display time ("HH:MM").
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Payload of an `im.ack` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImAckPayload {
    pub message_id: String,
    pub conversation_id: String,
    pub status: String,
    #[serde(default)]
    pub time: String,
}

/// Payload of an `im.error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImErrorPayload {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Payload of a `status.change` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangePayload {
    pub user_id: String,
    /// "online" or "offline".
    pub status: String,
}

/// A dispatched event: its type, payload and the server metadata that came with it.
#[derive(Debug, Clone)]
pub struct SocketEvent {
    /// The type of event.
    pub event_type: SocketEventType,
    /// The event payload.
    pub data: serde_json::Value,
    /// Server send time, when the frame carried one.
    pub timestamp: Option<serde_json::Number>,
    /// Server event id, when the frame carried one.
    pub event_id: Option<String>,
}

impl SocketEvent {
    /// Build a locally synthesized event.
    pub fn local(event_type: SocketEventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: None,
            event_id: None,
        }
    }

    /// The `ws.connected` notification.
    pub fn connected() -> Self {
        Self::local(SocketEventType::Connected, serde_json::json!({}))
    }

    /// The `ws.disconnected` notification carrying the close code.
    pub fn disconnected(code: Option<u16>) -> Self {
        Self::local(
            SocketEventType::Disconnected,
            serde_json::json!({ "code": code }),
        )
    }

    fn typed<T: serde::de::DeserializeOwned>(&self, expected: SocketEventType) -> Option<T> {
        if self.event_type == expected {
            serde_json::from_value(self.data.clone()).ok()
        } else {
            None
        }
    }

    /// Try to parse the data as a DisconnectedPayload.
    pub fn as_disconnected(&self) -> Option<DisconnectedPayload> {
        self.typed(SocketEventType::Disconnected)
    }

    /// Try to parse the data as a KickPayload.
    pub fn as_kick(&self) -> Option<KickPayload> {
        self.typed(SocketEventType::Kick)
    }

    /// Try to parse the data as an ImMessagePayload.
    pub fn as_im_message(&self) -> Option<ImMessagePayload> {
        self.typed(SocketEventType::ImMessage)
    }

    /// Try to parse the data as an ImAckPayload.
    pub fn as_im_ack(&self) -> Option<ImAckPayload> {
        self.typed(SocketEventType::ImAck)
    }

    /// Try to parse the data as an ImErrorPayload.
    pub fn as_im_error(&self) -> Option<ImErrorPayload> {
        self.typed(SocketEventType::ImError)
    }

    /// Try to parse the data as a StatusChangePayload.
    pub fn as_status_change(&self) -> Option<StatusChangePayload> {
        self.typed(SocketEventType::StatusChange)
    }
}

impl From<Frame> for SocketEvent {
    fn from(frame: Frame) -> Self {
        Self {
            event_type: SocketEventType::from_str(&frame.frame_type),
            data: frame.data.unwrap_or_default(),
            timestamp: frame.timestamp,
            event_id: frame.event_id,
        }
    }
}

/// Lifecycle state of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Transport requested, not yet open.
    Connecting,
    /// Transport open; heartbeat running.
    Open,
    /// Normal close requested, waiting for the transport to confirm.
    Closing,
    /// Transport gone. A reconnect may be pending.
    Closed,
}

impl ConnectionState {
    /// Whether a connect request would be a no-op.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(SocketEventType::from_str("sys.kick"), SocketEventType::Kick);
        assert_eq!(SocketEventType::from_str("im.message"), SocketEventType::ImMessage);
        assert_eq!(
            SocketEventType::from_str("screen.ranking.update"),
            SocketEventType::ScreenRankingUpdate
        );
        assert_eq!(
            SocketEventType::from_str("order.created"),
            SocketEventType::Custom("order.created".into())
        );
    }

    #[test]
    fn test_custom_type_keeps_exact_string() {
        let t = SocketEventType::from("Presence.Update");
        assert_eq!(t.as_str(), "Presence.Update");
        assert_ne!(t, SocketEventType::from("presence.update"));
    }

    #[test]
    fn test_event_type_categories() {
        assert!(SocketEventType::Connected.is_local());
        assert!(!SocketEventType::Kick.is_local());
        assert!(SocketEventType::ImAck.is_im_event());
        assert!(SocketEventType::ScreenV2Update.is_screen_event());
        assert!(!SocketEventType::StatusChange.is_screen_event());
    }

    #[test]
    fn test_event_from_frame_keeps_metadata() {
        let frame = Frame {
            frame_type: "im.ack".into(),
            data: Some(json!({"messageId": "m1", "conversationId": "c1", "status": "sent", "time": "09:30"})),
            timestamp: Some(42.into()),
            event_id: Some("e1".into()),
        };
        let event = SocketEvent::from(frame);
        assert_eq!(event.event_type, SocketEventType::ImAck);
        assert_eq!(event.timestamp, Some(serde_json::Number::from(42)));
        assert_eq!(event.event_id.as_deref(), Some("e1"));
        let ack = event.as_im_ack().unwrap();
        assert_eq!(ack.message_id, "m1");
        assert_eq!(ack.status, "sent");
    }

    #[test]
    fn test_disconnected_payload() {
        let event = SocketEvent::disconnected(Some(1006));
        assert_eq!(event.as_disconnected().unwrap().code, Some(1006));
        assert_eq!(SocketEvent::disconnected(None).as_disconnected().unwrap().code, None);
    }

    #[test]
    fn test_kick_payload() {
        let event = SocketEvent::from(Frame::new("sys.kick", json!({"reason": "logged_in_elsewhere"})));
        assert_eq!(event.as_kick().unwrap().reason.as_deref(), Some("logged_in_elsewhere"));
        // Wrong type should return None
        assert!(event.as_status_change().is_none());
    }

    #[test]
    fn test_im_message_payload() {
        let event = SocketEvent::from(Frame::new(
            "im.message",
            json!({
                "id": "m9", "conversationId": "c1", "senderId": "u2", "senderName": "Li",
                "direction": "received", "type": "text", "content": "hello", "time": "10:01",
                "fileName": null, "fileSize": null
            }),
        ));
        let msg = event.as_im_message().unwrap();
        assert_eq!(msg.content_type, "text");
        assert_eq!(msg.content, "hello");
        assert!(msg.file_name.is_none());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Closing.is_active());
    }
}
