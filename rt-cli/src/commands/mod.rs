//! CLI command implementations.

pub mod connect;
pub mod send;
pub mod status;

use std::sync::Arc;

use dialoguer::{Input, Password};

use rt_core::config::{AppConfig, ConfigHandle};
use rt_core::error::{RtError, RtResult};
use rt_socket::{SocketEvent, SocketManager, WsConnector};

use crate::OutputFormat;

/// Resolve the server address and token: arg > config > interactive prompt.
///
/// The resolved values are written back into `config`.
pub async fn resolve_credentials(
    config: &ConfigHandle,
    address: Option<String>,
    token: Option<String>,
) -> RtResult<String> {
    let addr = match address {
        Some(a) => a,
        None => {
            let current = config.read().await.server.address.clone();
            if current.is_empty() {
                Input::new()
                    .with_prompt("Server address")
                    .interact_text()
                    .map_err(|e| RtError::Internal(e.to_string()))?
            } else {
                current
            }
        }
    };

    let token = match token {
        Some(t) => t,
        None => match config.read().await.server.token.clone() {
            Some(t) if !t.is_empty() => t,
            _ => Password::new()
                .with_prompt("Session token")
                .interact()
                .map_err(|e| RtError::Internal(e.to_string()))?,
        },
    };

    let mut cfg = config.write().await;
    cfg.server.address = AppConfig::sanitize_server_address(&addr);
    cfg.server.token = Some(token.clone());
    if cfg.server.address.is_empty() {
        return Err(RtError::MissingConfig("server address".into()));
    }
    Ok(token)
}

/// Build a manager over a real WebSocket connector from the current config.
pub async fn create_manager(config: &ConfigHandle) -> Arc<SocketManager> {
    let cfg = config.read().await;
    let connector = Arc::new(WsConnector::from(&cfg.server));
    Arc::new(SocketManager::from_config(&cfg, connector))
}

/// Render one event for output.
pub fn format_event(event: &SocketEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::json!({
            "type": event.event_type.as_str(),
            "data": event.data,
            "timestamp": event.timestamp,
            "eventId": event.event_id,
        })
        .to_string(),
        OutputFormat::Text => format!("[{}] {}", event.event_type, event.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_socket::SocketEventType;

    #[test]
    fn test_format_event_json_keeps_metadata() {
        let event = SocketEvent {
            event_type: SocketEventType::StatusChange,
            data: serde_json::json!({"userId": "u1", "status": "online"}),
            timestamp: Some(17.into()),
            event_id: Some("e9".into()),
        };
        let line = format_event(&event, OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["type"], "status.change");
        assert_eq!(parsed["eventId"], "e9");
        assert_eq!(parsed["timestamp"], 17);
    }

    #[test]
    fn test_format_event_text() {
        let event = SocketEvent::disconnected(Some(1006));
        assert_eq!(
            format_event(&event, OutputFormat::Text),
            r#"[ws.disconnected] {"code":1006}"#
        );
    }

    #[tokio::test]
    async fn test_resolve_credentials_prefers_args() {
        let config = ConfigHandle::new(AppConfig::default());
        let token = resolve_credentials(&config, Some("rt.example.com/".into()), Some("abc".into()))
            .await
            .unwrap();
        assert_eq!(token, "abc");
        let cfg = config.read().await;
        assert_eq!(cfg.server.address, "http://rt.example.com");
        assert_eq!(cfg.server.token.as_deref(), Some("abc"));
    }
}
