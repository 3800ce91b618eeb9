//! In-memory transport for tests and embedders.
//!
//! [`MemoryConnector`] records every `open` and hands back a
//! [`MemorySocket`]: the server side of the fake connection, through which a
//! test pushes transport events and inspects what the client wrote.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use rt_core::error::{RtError, RtResult};

use super::{Connector, Transport, TransportEvent, TransportEventSender};

#[derive(Default)]
struct ConnectorState {
    opened: Vec<Url>,
    sockets: Vec<MemorySocket>,
    fail_next: usize,
    hold_close: bool,
}

/// Connector producing in-memory transports.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `open` fail at construction.
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// When set, a client close request is only recorded; the test reports
    /// the close itself via [`MemorySocket::close`].
    pub fn hold_close_requests(&self, hold: bool) {
        self.state.lock().hold_close = hold;
    }

    /// Number of `open` calls, including failed ones.
    pub fn open_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Every URL passed to `open`.
    pub fn opened_urls(&self) -> Vec<Url> {
        self.state.lock().opened.clone()
    }

    /// Transports whose handle the client still holds and that have not closed.
    pub fn live_count(&self) -> usize {
        self.state.lock().sockets.iter().filter(|s| s.is_live()).count()
    }

    /// The most recently constructed socket.
    pub fn latest(&self) -> Option<MemorySocket> {
        self.state.lock().sockets.last().cloned()
    }

    /// All constructed sockets, oldest first.
    pub fn sockets(&self) -> Vec<MemorySocket> {
        self.state.lock().sockets.clone()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &Url, events: TransportEventSender) -> RtResult<Box<dyn Transport>> {
        let mut state = self.state.lock();
        state.opened.push(url.clone());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(RtError::Transport("scripted open failure".into()));
        }

        let socket = MemorySocket {
            shared: Arc::new(SocketShared {
                url: url.clone(),
                events,
                written: Mutex::new(Vec::new()),
                close_requests: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                dropped: AtomicBool::new(false),
                hold_close: state.hold_close,
            }),
        };
        state.sockets.push(socket.clone());
        Ok(Box::new(MemoryTransport {
            shared: socket.shared.clone(),
        }))
    }
}

struct SocketShared {
    url: Url,
    events: TransportEventSender,
    written: Mutex<Vec<String>>,
    close_requests: Mutex<Vec<u16>>,
    closed: AtomicBool,
    dropped: AtomicBool,
    hold_close: bool,
}

impl SocketShared {
    fn push(&self, event: TransportEvent) {
        if let TransportEvent::Closed { .. } = event {
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        let _ = self.events.send(event);
    }
}

/// Server side of an in-memory transport.
#[derive(Clone)]
pub struct MemorySocket {
    shared: Arc<SocketShared>,
}

impl MemorySocket {
    /// URL the client opened.
    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    /// Complete the handshake.
    pub fn open(&self) {
        self.shared.push(TransportEvent::Opened);
    }

    /// Deliver one raw text message to the client.
    pub fn receive_text(&self, raw: impl Into<String>) {
        self.shared.push(TransportEvent::Text(raw.into()));
    }

    /// Deliver a `{type, data}` frame to the client.
    pub fn receive_frame(&self, frame_type: &str, data: serde_json::Value) {
        self.receive_text(serde_json::json!({ "type": frame_type, "data": data }).to_string());
    }

    /// Report a transport error; callers follow up with [`close`](Self::close).
    pub fn error(&self, message: impl Into<String>) {
        self.shared.push(TransportEvent::Error(message.into()));
    }

    /// Report the transport closed with `code`. Only the first close is delivered.
    pub fn close(&self, code: Option<u16>) {
        self.shared.push(TransportEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Text messages the client wrote, oldest first.
    pub fn written(&self) -> Vec<String> {
        self.shared.written.lock().clone()
    }

    /// Close codes the client requested.
    pub fn close_requests(&self) -> Vec<u16> {
        self.shared.close_requests.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether the client still holds the handle and the socket has not closed.
    pub fn is_live(&self) -> bool {
        !self.is_closed() && !self.shared.dropped.load(Ordering::SeqCst)
    }
}

struct MemoryTransport {
    shared: Arc<SocketShared>,
}

impl Transport for MemoryTransport {
    fn send_text(&self, text: String) -> RtResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RtError::NotConnected);
        }
        self.shared.written.lock().push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        self.shared.close_requests.lock().push(code);
        if !self.shared.hold_close {
            self.shared.push(TransportEvent::Closed {
                code: Some(code),
                reason: reason.to_string(),
            });
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.shared.dropped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn url() -> Url {
        Url::parse("ws://localhost/api/v1/ws/connect?token=abc").unwrap()
    }

    #[test]
    fn test_records_opens_and_writes() {
        let connector = MemoryConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = connector.open(&url(), tx).unwrap();
        transport.send_text("hello".into()).unwrap();

        let socket = connector.latest().unwrap();
        assert_eq!(connector.open_count(), 1);
        assert_eq!(socket.written(), vec!["hello".to_string()]);
        assert!(socket.is_live());

        drop(transport);
        assert!(!socket.is_live());
        assert_eq!(connector.live_count(), 0);
    }

    #[test]
    fn test_scripted_failure() {
        let connector = MemoryConnector::new();
        connector.fail_next_opens(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(connector.open(&url(), tx.clone()).is_err());
        assert!(connector.open(&url(), tx).is_ok());
        assert_eq!(connector.open_count(), 2);
        assert_eq!(connector.sockets().len(), 1);
    }

    #[test]
    fn test_close_delivered_once() {
        let connector = MemoryConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = connector.open(&url(), tx).unwrap();
        transport.close(1000, "bye");
        connector.latest().unwrap().close(Some(1006));

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Closed { code: Some(1000), reason: "bye".into() }
        );
        assert!(rx.try_recv().is_err());
        assert!(transport.send_text("late".into()).is_err());
    }
}
