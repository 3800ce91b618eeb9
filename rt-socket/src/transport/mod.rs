//! Transport seam between the connection manager and the socket.
//!
//! A [`Connector`] opens one transport per connection attempt and returns
//! immediately; everything the socket does afterwards arrives as
//! [`TransportEvent`]s on the channel handed to `open`.

mod memory;
mod ws;

use tokio::sync::mpsc;
use url::Url;

use rt_core::error::RtResult;

pub use memory::{MemoryConnector, MemorySocket};
pub use ws::WsConnector;

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// One inbound text message.
    Text(String),
    /// The transport is gone. Always the last event of a transport.
    Closed {
        /// Close code from the close frame; `None` when the socket died without one.
        code: Option<u16>,
        reason: String,
    },
    /// A transport-level failure. A `Closed` event follows.
    Error(String),
}

/// Sending half handed to [`Connector::open`].
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// A live transport handle. Dropping it abandons the socket without events.
pub trait Transport: Send + Sync {
    /// Queue one text message for writing.
    fn send_text(&self, text: String) -> RtResult<()>;

    /// Request a close with `code`. A `Closed` event follows.
    fn close(&self, code: u16, reason: &str);
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Start opening a transport to `url`.
    ///
    /// Returns without waiting for the handshake. An `Err` means the
    /// transport could not even be constructed.
    fn open(&self, url: &Url, events: TransportEventSender) -> RtResult<Box<dyn Transport>>;
}
