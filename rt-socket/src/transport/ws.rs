//! WebSocket transport over tokio-tungstenite.

use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use rt_core::config::ServerConfig;
use rt_core::error::{RtError, RtResult};

use super::{Connector, Transport, TransportEvent, TransportEventSender};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the server to echo our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Send(String),
    Close { code: u16, reason: String },
}

/// Opens real WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for WsConnector {
    fn from(config: &ServerConfig) -> Self {
        Self::new(config.connect_timeout())
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &Url, events: TransportEventSender) -> RtResult<Box<dyn Transport>> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RtError::InvalidUrl(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RtError::Transport(format!("no async runtime: {e}")))?;

        let (commands, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(request, self.connect_timeout, rx, events));
        Ok(Box::new(WsTransport { commands }))
    }
}

struct WsTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> RtResult<()> {
        self.commands
            .send(Command::Send(text))
            .map_err(|_| RtError::NotConnected)
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

fn closed(events: &TransportEventSender, code: Option<u16>, reason: impl Into<String>) {
    let _ = events.send(TransportEvent::Closed {
        code,
        reason: reason.into(),
    });
}

fn failed(events: &TransportEventSender, error: impl Into<String>) {
    let _ = events.send(TransportEvent::Error(error.into()));
    closed(events, None, "");
}

/// Drive one socket from handshake to close.
async fn run_socket(
    request: Request,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: TransportEventSender,
) {
    let connect = tokio::time::timeout(connect_timeout, connect_async(request));
    tokio::pin!(connect);

    let stream: WsStream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(Ok((stream, _response))) => break stream,
                Ok(Err(e)) => return failed(&events, e.to_string()),
                Err(_) => return failed(&events, format!("connect timed out after {connect_timeout:?}")),
            },
            cmd = commands.recv() => match cmd {
                Some(Command::Close { code, reason }) => return closed(&events, Some(code), reason),
                Some(Command::Send(_)) => debug!("dropping frame written before open"),
                // Handle dropped: abandoned, report nothing.
                None => return,
            },
        }
    };

    let _ = events.send(TransportEvent::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return failed(&events, e.to_string());
                    }
                }
                Some(Command::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        warn!("close frame write failed: {e}");
                    }
                    let echoed = tokio::select! {
                        echoed = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, await_close(&mut read)) => {
                            echoed.ok().flatten()
                        }
                        // Handle dropped mid-handshake: abandoned, stop waiting for the echo.
                        () = handle_dropped(&mut commands) => return,
                    };
                    return closed(&events, Some(echoed.unwrap_or(code)), reason);
                }
                None => {
                    let _ = write.close().await;
                    return;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("ignoring {} byte binary message", data.len());
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Protocol-level keepalive; tungstenite answers pings itself.
                    trace!("protocol ping/pong");
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    return closed(&events, code, reason);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return failed(&events, e.to_string()),
                None => return closed(&events, None, ""),
            },
        }
    }
}

/// Resolves once the transport handle is gone. Later commands are ignored.
async fn handle_dropped(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while commands.recv().await.is_some() {}
}

/// Read until the peer's close frame; returns its code.
async fn await_close(read: &mut SplitStream<WsStream>) -> Option<u16> {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_returns_immediately_and_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = WsConnector::new(Duration::from_secs(2));
        // Nothing listens on port 9 (discard) in test environments.
        let url = Url::parse("ws://127.0.0.1:9/api/v1/ws/connect?token=abc").unwrap();
        let _transport = connector.open(&url, tx).unwrap();

        let mut saw_closed = false;
        while let Some(event) = rx.recv().await {
            if let TransportEvent::Closed { code, .. } = event {
                assert_eq!(code, None);
                saw_closed = true;
                break;
            }
        }
        assert!(saw_closed);
    }

    #[tokio::test]
    async fn test_close_before_open_reports_requested_code() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = WsConnector::new(Duration::from_secs(30));
        // Non-routable address keeps the handshake pending.
        let url = Url::parse("ws://10.255.255.1:81/api/v1/ws/connect?token=abc").unwrap();
        let transport = connector.open(&url, tx).unwrap();
        transport.close(1000, "bye");

        match rx.recv().await {
            Some(TransportEvent::Closed { code, reason }) => {
                assert_eq!(code, Some(1000));
                assert_eq!(reason, "bye");
            }
            Some(TransportEvent::Error(_)) => {
                // Some sandboxes reject the route immediately.
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abandoned_close_skips_handshake_wait() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Server completes the upgrade, then never reads so our close is never echoed.
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/api/v1/ws/connect?token=abc")).unwrap();
        let transport = WsConnector::new(Duration::from_secs(5)).open(&url, tx).unwrap();
        assert!(matches!(rx.recv().await, Some(TransportEvent::Opened)));

        transport.close(1000, "");
        drop(transport);

        let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(ended, Ok(None)));
        server.abort();
    }

    #[test]
    fn test_open_outside_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let url = Url::parse("ws://localhost:8000/api/v1/ws/connect?token=abc").unwrap();
        let result = WsConnector::default().open(&url, tx);
        assert!(matches!(result, Err(RtError::Transport(_))));
    }
}
