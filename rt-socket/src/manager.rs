//! Realtime connection manager.
//!
//! Owns the single shared connection to the realtime endpoint and drives it
//! through its lifecycle:
//! - Opening a transport with the caller's credential (idempotent while active)
//! - Heartbeat pings every 30 seconds while open, with an optional pong watchdog
//! - Automatic reconnection with capped exponential backoff (1s, 2s, 4s, ... 30s)
//! - Suppressing reconnection after a normal close, a local disconnect or a kick
//! - Routing inbound frames to the [`EventDispatcher`]
//!
//! The public API is synchronous and never blocks on the network. Transport
//! activity arrives on a per-transport event pump; every transport is tagged
//! with a generation number so events from an abandoned transport are ignored.
//! Subscriber callbacks always run after the internal lock is released.

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use rt_core::config::{endpoint_url, redact_endpoint, AppConfig};
use rt_core::constants::{frame_types, CLOSE_NORMAL};
use rt_core::error::{RtError, RtResult};

use crate::backoff::{ReconnectConfig, ReconnectScheduler};
use crate::dispatcher::{EventDispatcher, EventHandler};
use crate::events::{ConnectionState, SocketEvent, SocketEventType};
use crate::frame::Frame;
use crate::heartbeat::{HealthCheckConfig, Heartbeat};
use crate::transport::{Connector, Transport, TransportEvent};

/// Events collected under the lock, dispatched after it is released.
type Notifications = Vec<SocketEvent>;

/// Mutable connection state. Guarded by one lock so every transition is atomic.
struct Inner {
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    /// Bumped for every transport; events tagged with an older value are stale.
    generation: u64,
    /// Last credential passed to `connect`, reused by reconnects.
    credential: Option<String>,
    reconnect_attempt: u32,
    /// Set by a local disconnect or a kick; cleared by the next explicit connect.
    suppress_reconnect: bool,
    /// Send time of the oldest ping not yet answered by a pong.
    unanswered_ping: Option<Instant>,
    heartbeat: Heartbeat,
    reconnect: ReconnectScheduler,
}

/// Manager of the shared realtime connection.
///
/// Build it, wrap it in an `Arc`, and share that `Arc` with every consumer.
/// Background tasks only hold weak references, so dropping the last `Arc`
/// tears the connection down.
pub struct SocketManager {
    /// Server address the endpoint URL is derived from.
    address: String,
    /// Opens transports.
    connector: Arc<dyn Connector>,
    /// Event dispatcher for subscriber callbacks.
    dispatcher: EventDispatcher,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Health check configuration.
    health_config: HealthCheckConfig,
    /// Disconnect when the last binding goes away.
    pub(crate) disconnect_when_unbound: bool,
    /// Live binding count.
    pub(crate) bindings: AtomicUsize,
    /// Watch channel for state change notifications.
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

impl SocketManager {
    /// Create a manager for the server at `address`.
    pub fn new(
        address: impl Into<String>,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Self {
            address: address.into(),
            connector,
            dispatcher,
            reconnect_config: ReconnectConfig::default(),
            health_config: HealthCheckConfig::default(),
            disconnect_when_unbound: true,
            bindings: AtomicUsize::new(0),
            state_tx,
            inner: Mutex::new(Inner {
                state: ConnectionState::Idle,
                transport: None,
                generation: 0,
                credential: None,
                reconnect_attempt: 0,
                suppress_reconnect: false,
                unanswered_ping: None,
                heartbeat: Heartbeat::new(),
                reconnect: ReconnectScheduler::new(),
            }),
        }
    }

    /// Create a manager with every tunable taken from `config`.
    pub fn from_config(config: &AppConfig, connector: Arc<dyn Connector>) -> Self {
        Self::new(
            config.server.address.clone(),
            connector,
            EventDispatcher::new(config.realtime.event_channel_capacity),
        )
        .with_reconnect_config(ReconnectConfig::from(&config.realtime))
        .with_health_config(HealthCheckConfig::from(&config.realtime))
        .with_disconnect_when_unbound(config.realtime.disconnect_when_unbound)
    }

    /// Set custom reconnection configuration.
    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect_config = config;
        self
    }

    /// Set custom health check configuration.
    pub fn with_health_config(mut self, config: HealthCheckConfig) -> Self {
        self.health_config = config;
        self
    }

    /// Choose whether dropping the last binding disconnects.
    pub fn with_disconnect_when_unbound(mut self, enabled: bool) -> Self {
        self.disconnect_when_unbound = enabled;
        self
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Get the event dispatcher (for subscribing to events).
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.lock().reconnect_attempt
    }

    /// Delay of the pending reconnect timer, if one is armed.
    pub fn pending_reconnect_delay(&self) -> Option<Duration> {
        self.inner.lock().reconnect.pending_delay()
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.inner.lock().heartbeat.is_running()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> RtResult<()> {
        let mut rx = self.state_tx.subscribe();
        let reached = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| *state == target).await.map(|_| ())
        })
        .await;
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RtError::Internal("state channel closed".into())),
            Err(_) => Err(RtError::Timeout(format!(
                "socket did not become {target} within {timeout:?}"
            ))),
        }
    }

    /// Register `handler` for `event_type`. Subscriptions survive reconnects.
    pub fn on(&self, event_type: impl Into<SocketEventType>, handler: EventHandler) {
        self.dispatcher.on(event_type.into(), handler);
    }

    /// Remove `handler` from `event_type`.
    pub fn off(&self, event_type: impl Into<SocketEventType>, handler: &EventHandler) {
        self.dispatcher.off(&event_type.into(), handler);
    }

    /// Open the shared connection with `credential`.
    ///
    /// A no-op while connecting or open. Otherwise the credential is stored
    /// for reconnects, any pending reconnect is cancelled and a new transport
    /// is requested. Returns immediately; a transport that cannot be built is
    /// reported as `ws.disconnected` and retried like any abnormal close.
    pub fn connect(self: &Arc<Self>, credential: impl Into<String>) {
        let notes = {
            let mut inner = self.inner.lock();
            self.open_transport(&mut inner, credential.into())
        };
        self.emit(notes);
    }

    /// Close the connection and stay closed.
    ///
    /// Cancels any pending reconnect, stops the heartbeat and requests a
    /// normal close. No reconnect is scheduled until the next `connect`.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        let cancelled = inner.reconnect.cancel();
        inner.heartbeat.stop();
        inner.suppress_reconnect = true;
        inner.reconnect_attempt = 0;

        match inner.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                info!("socket disconnecting");
                if let Some(transport) = inner.transport.as_ref() {
                    transport.close(CLOSE_NORMAL, "client disconnect");
                }
                self.set_state(&mut inner, ConnectionState::Closing);
            }
            ConnectionState::Closing => debug!("socket already closing"),
            ConnectionState::Idle | ConnectionState::Closed => {
                if cancelled {
                    info!("pending reconnect cancelled");
                }
            }
        }
    }

    /// Whole-process teardown: disconnect and forget the credential.
    pub fn shutdown(&self) {
        info!("socket manager shutting down");
        self.disconnect();
        self.inner.lock().credential = None;
    }

    /// Send a `{type, data}` frame.
    ///
    /// Returns false without writing anything unless the connection is open.
    pub fn send<T: Serialize>(&self, event_type: &str, data: T) -> bool {
        let inner = self.inner.lock();
        if inner.state != ConnectionState::Open {
            warn!("socket not open ({}), dropping {event_type}", inner.state);
            return false;
        }

        let result = serde_json::to_value(data)
            .map_err(RtError::from)
            .and_then(|data| write_frame(&inner, &Frame::new(event_type, data)));
        match result {
            Ok(()) => {
                debug!("sent {event_type}");
                true
            }
            Err(e) => {
                warn!("failed to send {event_type}: {e}");
                false
            }
        }
    }

    fn set_state(&self, inner: &mut Inner, new_state: ConnectionState) {
        if inner.state != new_state {
            info!("socket state: {} -> {}", inner.state, new_state);
            inner.state = new_state;
            self.state_tx.send_replace(new_state);
        }
    }

    fn emit(&self, notes: Notifications) {
        for event in notes {
            self.dispatcher.dispatch(event);
        }
    }

    fn open_transport(self: &Arc<Self>, inner: &mut Inner, credential: String) -> Notifications {
        if inner.state.is_active() {
            debug!("socket already {}, skipping connect", inner.state);
            return Vec::new();
        }
        if inner.reconnect.cancel() {
            debug!("pending reconnect superseded by connect");
        }
        if inner.state == ConnectionState::Closing {
            // The old close is still in flight; stop listening to it.
            debug!("abandoning closing transport #{}", inner.generation);
            inner.transport = None;
        }
        inner.heartbeat.stop();
        inner.credential = Some(credential.clone());
        inner.suppress_reconnect = false;
        inner.generation += 1;
        let generation = inner.generation;
        self.set_state(inner, ConnectionState::Connecting);

        let url = match endpoint_url(&self.address, &credential) {
            Ok(url) => url,
            Err(e) => return self.construction_failed(inner, e),
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("connect called outside a tokio runtime");
            self.set_state(inner, ConnectionState::Closed);
            return vec![SocketEvent::disconnected(None)];
        };

        info!("socket connecting to {} (transport #{generation})", redact_endpoint(&url));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match self.connector.open(&url, events_tx) {
            Ok(transport) => {
                inner.transport = Some(transport);
                runtime.spawn(pump_events(Arc::downgrade(self), generation, events_rx));
                Vec::new()
            }
            Err(e) => self.construction_failed(inner, e),
        }
    }

    fn construction_failed(self: &Arc<Self>, inner: &mut Inner, err: RtError) -> Notifications {
        error!("failed to create transport: {err}");
        self.transport_closed(inner, None)
    }

    /// Handle one event from transport `generation`. Returns false once the
    /// transport is stale and its pump should stop.
    fn transport_event(self: &Arc<Self>, generation: u64, event: TransportEvent) -> bool {
        let notes = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                trace!("ignoring event from stale transport #{generation}");
                return false;
            }
            match event {
                TransportEvent::Opened => self.transport_opened(&mut inner),
                TransportEvent::Text(raw) => self.frame_received(&mut inner, &raw),
                TransportEvent::Closed { code, reason } => {
                    debug!("transport #{generation} closed: code {code:?} reason {reason:?}");
                    self.transport_closed(&mut inner, code)
                }
                TransportEvent::Error(e) => {
                    warn!("transport #{generation} error: {e}");
                    Vec::new()
                }
            }
        };
        self.emit(notes);
        true
    }

    fn transport_opened(self: &Arc<Self>, inner: &mut Inner) -> Notifications {
        if inner.state != ConnectionState::Connecting {
            debug!("transport opened while {}, ignoring", inner.state);
            return Vec::new();
        }
        inner.reconnect_attempt = 0;
        inner.unanswered_ping = None;
        self.set_state(inner, ConnectionState::Open);

        let weak = Arc::downgrade(self);
        let generation = inner.generation;
        inner.heartbeat.start(self.health_config.interval, move || {
            weak.upgrade()
                .is_some_and(|manager| manager.heartbeat_tick(generation))
        });

        vec![SocketEvent::connected()]
    }

    fn frame_received(&self, inner: &mut Inner, raw: &str) -> Notifications {
        if inner.state != ConnectionState::Open {
            trace!("dropping frame received while {}", inner.state);
            return Vec::new();
        }
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("discarding malformed frame: {e}");
                return Vec::new();
            }
        };

        match frame.frame_type.as_str() {
            frame_types::PONG => {
                trace!("pong");
                inner.unanswered_ping = None;
                Vec::new()
            }
            frame_types::KICK => self.kicked(inner, frame),
            _ => vec![SocketEvent::from(frame)],
        }
    }

    fn kicked(&self, inner: &mut Inner, frame: Frame) -> Notifications {
        let event = SocketEvent::from(frame);
        let reason = event
            .as_kick()
            .and_then(|kick| kick.reason)
            .unwrap_or_else(|| "unspecified".to_string());
        warn!("kicked by server: {reason}");

        inner.suppress_reconnect = true;
        inner.reconnect.cancel();
        inner.heartbeat.stop();
        if let Some(transport) = inner.transport.as_ref() {
            transport.close(CLOSE_NORMAL, "kicked");
        }
        self.set_state(inner, ConnectionState::Closing);
        vec![event]
    }

    fn transport_closed(self: &Arc<Self>, inner: &mut Inner, code: Option<u16>) -> Notifications {
        if !matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing
        ) {
            return Vec::new();
        }
        inner.heartbeat.stop();
        inner.transport = None;
        self.set_state(inner, ConnectionState::Closed);

        if inner.suppress_reconnect {
            info!("socket closed (code {code:?}), reconnect suppressed");
        } else if code == Some(CLOSE_NORMAL) {
            info!("socket closed normally");
        } else {
            warn!("socket closed abnormally (code {code:?})");
            self.schedule_reconnect(inner);
        }
        vec![SocketEvent::disconnected(code)]
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if inner.reconnect.is_pending() {
            debug!("reconnect already pending");
            return;
        }
        let attempt = inner.reconnect_attempt;
        if self.reconnect_config.exhausted(attempt) {
            error!("giving up after {attempt} reconnect attempts");
            return;
        }

        let delay = self.reconnect_config.jittered_delay(attempt);
        inner.reconnect_attempt += 1;
        let weak = Arc::downgrade(self);
        inner.reconnect.schedule(delay, move |id| async move {
            if let Some(manager) = weak.upgrade() {
                manager.reconnect_fired(id);
            }
        });
        info!(
            "reconnecting in {:.1}s (attempt {})",
            delay.as_secs_f64(),
            inner.reconnect_attempt
        );
    }

    fn reconnect_fired(self: &Arc<Self>, id: u64) {
        let notes = {
            let mut inner = self.inner.lock();
            if !inner.reconnect.take_if_current(id) {
                return;
            }
            let Some(credential) = inner.credential.clone() else {
                return;
            };
            self.open_transport(&mut inner, credential)
        };
        self.emit(notes);
    }

    /// One heartbeat tick for transport `generation`. Returns false to stop the timer.
    fn heartbeat_tick(self: &Arc<Self>, generation: u64) -> bool {
        let notes = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Open {
                return false;
            }

            let overdue = match (self.health_config.pong_timeout, inner.unanswered_ping) {
                (Some(timeout), Some(sent)) => Some(sent.elapsed()).filter(|waited| *waited >= timeout),
                _ => None,
            };
            match overdue {
                Some(waited) => {
                    warn!(
                        "no pong {:.1}s after ping, treating connection as dead",
                        waited.as_secs_f64()
                    );
                    self.transport_closed(&mut inner, None)
                }
                None => {
                    match write_frame(&inner, &Frame::ping()) {
                        Ok(()) => {
                            trace!("heartbeat ping");
                            inner.unanswered_ping.get_or_insert_with(Instant::now);
                        }
                        Err(e) => warn!("heartbeat ping failed: {e}"),
                    }
                    return true;
                }
            }
        };
        self.emit(notes);
        false
    }
}

fn write_frame(inner: &Inner, frame: &Frame) -> RtResult<()> {
    let transport = inner.transport.as_ref().ok_or(RtError::NotConnected)?;
    transport.send_text(frame.encode()?)
}

/// Forward events from one transport until it closes or goes stale.
async fn pump_events(
    manager: Weak<SocketManager>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if !manager.transport_event(generation, event) {
            break;
        }
    }
    trace!("event pump for transport #{generation} finished");
}

impl std::fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SocketManager")
            .field("address", &self.address)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("reconnect_attempt", &inner.reconnect_attempt)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn manager(connector: &MemoryConnector) -> Arc<SocketManager> {
        Arc::new(SocketManager::new(
            "http://localhost:8000",
            Arc::new(connector.clone()),
            EventDispatcher::new(16),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_transport() {
        let connector = MemoryConnector::new();
        let manager = manager(&connector);
        assert_eq!(manager.state(), ConnectionState::Idle);

        manager.connect("abc");
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            connector.opened_urls()[0].as_str(),
            "ws://localhost:8000/api/v1/ws/connect?token=abc"
        );

        connector.latest().unwrap().open();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.is_heartbeat_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_receiver_sees_transitions() {
        let connector = MemoryConnector::new();
        let manager = manager(&connector);
        let mut rx = manager.state_receiver();

        manager.connect("abc");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        connector.latest().unwrap().open();
        manager
            .wait_for_state(ConnectionState::Open, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_times_out() {
        let connector = MemoryConnector::new();
        let manager = manager(&connector);
        manager.connect("abc");
        let result = manager
            .wait_for_state(ConnectionState::Open, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(RtError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting() {
        let connector = MemoryConnector::new();
        connector.hold_close_requests(true);
        let manager = manager(&connector);

        manager.connect("abc");
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Closing);
        let socket = connector.latest().unwrap();
        assert_eq!(socket.close_requests(), vec![1000]);

        // A late handshake does not resurrect the connection.
        socket.open();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Closing);

        socket.close(Some(1000));
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.pending_reconnect_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_closing_abandons_old_transport() {
        let connector = MemoryConnector::new();
        connector.hold_close_requests(true);
        let manager = manager(&connector);

        manager.connect("abc");
        let first = connector.latest().unwrap();
        first.open();
        settle().await;
        manager.disconnect();

        manager.connect("abc");
        assert_eq!(connector.open_count(), 2);
        assert!(!first.is_live());

        // The abandoned transport's close must not tear down the new one.
        first.close(Some(1006));
        connector.latest().unwrap().open();
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(manager.pending_reconnect_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_when_idle_stays_idle() {
        let connector = MemoryConnector::new();
        let manager = manager(&connector);
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_schedules_reconnect() {
        let connector = MemoryConnector::new();
        let manager = Arc::new(SocketManager::new(
            "",
            Arc::new(connector.clone()),
            EventDispatcher::new(16),
        ));

        manager.connect("abc");
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(connector.open_count(), 0);
        assert_eq!(manager.pending_reconnect_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_connect_outside_runtime_reports_disconnect() {
        let connector = MemoryConnector::new();
        let manager = manager(&connector);
        manager.connect("abc");
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(connector.open_count(), 0);
    }

    #[test]
    fn test_from_config() {
        let mut config = AppConfig::default();
        config.server.address = "https://rt.example.com".into();
        config.realtime.max_reconnect_attempts = 5;
        config.realtime.disconnect_when_unbound = false;

        let manager = SocketManager::from_config(&config, Arc::new(MemoryConnector::new()));
        assert_eq!(manager.reconnect_config.max_attempts, 5);
        assert!(!manager.disconnect_when_unbound);
        assert_eq!(manager.health_config.interval, Duration::from_secs(30));
    }
}
