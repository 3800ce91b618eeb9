//! Wire frame codec.
//!
//! Every message in either direction is one JSON object
//! `{ "type": string, "data": any, "timestamp"?: number, "eventId"?: string }`.
//! Outbound frames carry only `type` and `data`. The heartbeat ping is the one
//! frame written without `data`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use rt_core::error::{RtError, RtResult};

/// One discrete message exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Routing key.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Payload. Opaque to the connection manager; `None` when absent or null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Server send time in milliseconds since the epoch. Any JSON number is
    /// accepted; a non-numeric value is dropped without rejecting the frame.
    #[serde(
        default,
        deserialize_with = "number_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<Number>,
    /// Server-assigned event identifier.
    #[serde(default, rename = "eventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Frame {
    /// Build an outbound frame.
    pub fn new(frame_type: impl Into<String>, data: Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            data: Some(data),
            timestamp: None,
            event_id: None,
        }
    }

    /// The payload-less heartbeat frame.
    pub fn ping() -> Self {
        Self {
            data: None,
            ..Self::new(rt_core::constants::frame_types::PING, Value::Null)
        }
    }

    /// Serialize to the JSON text written to the transport.
    pub fn encode(&self) -> RtResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one inbound text message.
    pub fn decode(raw: &str) -> RtResult<Self> {
        let frame: Frame = serde_json::from_str(raw)
            .map_err(|e| RtError::Serialization(format!("frame decode error: {e}")))?;
        Ok(frame)
    }
}

fn number_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Number>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Ok(Some(n)),
        Some(other) => {
            tracing::debug!("ignoring non-numeric timestamp {other}");
            Ok(None)
        }
        None => Ok(None),
    }
}
