//! Connection manager
//!
//! Owns the single signaling connection. Commands (`connect`,
//! `send_message`, `disconnect`) and transport event reactions all take the
//! same state lock, so they apply in a single order no matter which thread
//! delivers them.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::state::{
    ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionPhase, ConnectivityStatus,
};
use crate::config::SignalingConfig;
use crate::error::{NotConnectedReason, Result, SignalError};
use crate::metrics::{Counters, CountersSnapshot};
use crate::protocol;
use crate::transport::{
    Connector, EventCallback, EventSink, ReadyState, TransportEvent, WebSocketConnector,
};

/// Buffered inbound messages per subscriber before it starts lagging
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Result of a `connect` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection handle was created
    Started(ConnectionId),
    /// A handle already existed; nothing was done
    AlreadyActive(ConnectionId),
}

impl ConnectOutcome {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Started(id) | Self::AlreadyActive(id) => *id,
        }
    }
}

/// State guarded by the manager lock
#[derive(Debug, Default)]
struct SharedState {
    handle: Option<ConnectionHandle>,
    status: ConnectivityStatus,
    messages: Vec<String>,
}

/// Manages the signaling connection
pub struct ConnectionManager {
    /// Back-reference handed to event sinks
    weak: Weak<ConnectionManager>,
    /// Endpoint configuration, read on every connect
    config: RwLock<SignalingConfig>,
    /// Opens transport links
    connector: Box<dyn Connector>,
    /// Handle, status and message log
    state: Mutex<SharedState>,
    /// ID generator
    next_id: AtomicU64,
    /// Status observers
    status_tx: watch::Sender<ConnectivityStatus>,
    /// Inbound message observers
    messages_tx: broadcast::Sender<String>,
    /// Activity counters
    counters: Counters,
}

impl ConnectionManager {
    /// Create a connection manager using the given connector
    pub fn new(config: SignalingConfig, connector: impl Connector + 'static) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectivityStatus::Disconnected);
        let (messages_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config: RwLock::new(config),
            connector: Box::new(connector),
            state: Mutex::new(SharedState::default()),
            next_id: AtomicU64::new(1),
            status_tx,
            messages_tx,
            counters: Counters::new(),
        })
    }

    /// Create a connection manager speaking WebSocket
    pub fn with_websocket(config: SignalingConfig) -> Arc<Self> {
        Self::new(config, WebSocketConnector::new())
    }

    /// Open the signaling connection.
    ///
    /// Returns once the handle is in place; the open acknowledgment arrives
    /// later and is visible through [`is_connected`](Self::is_connected).
    pub fn connect(&self) -> Result<ConnectOutcome> {
        let endpoint = match self.config.read().endpoint() {
            Some(endpoint) => endpoint.to_owned(),
            None => {
                error!("Signaling endpoint not configured");
                self.counters.connect_failed();
                return Err(SignalError::Configuration);
            }
        };

        let mut state = self.state.lock();

        if let Some(handle) = &state.handle {
            debug!(conn_id = %handle.id(), "Connection already exists, ignoring connect");
            return Ok(ConnectOutcome::AlreadyActive(handle.id()));
        }

        let id = ConnectionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sink = EventSink::new(id, self.event_callback());

        let link = match self.connector.open(&endpoint, sink) {
            Ok(link) => link,
            Err(e) => {
                warn!(conn_id = %id, %endpoint, error = %e, "Failed to open signaling transport");
                self.counters.connect_failed();
                return Err(e);
            }
        };

        // Stored before the lock is released, so no reaction can miss it.
        state.handle = Some(ConnectionHandle::new(id, endpoint.clone(), link));
        self.counters.connect_started();

        info!(conn_id = %id, %endpoint, "Connecting to signaling server");
        Ok(ConnectOutcome::Started(id))
    }

    /// Serialize `message` and send it over the open connection.
    ///
    /// Nothing is queued: unless the transport is open and its open event
    /// has been applied, the message is dropped and `NotConnected` is
    /// returned.
    pub fn send_message<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let mut state = self.state.lock();
        let status = state.status;

        let Some(handle) = state.handle.as_mut() else {
            warn!("Cannot send: not connected to signaling server");
            self.counters.send_dropped();
            return Err(SignalError::not_connected(NotConnectedReason::NoConnection));
        };

        let ready_state = handle.ready_state();
        if ready_state != ReadyState::Open {
            warn!(conn_id = %handle.id(), %ready_state, "Cannot send: signaling transport not open");
            self.counters.send_dropped();
            return Err(SignalError::not_connected(NotConnectedReason::NotOpen(ready_state)));
        }

        // The link can report open before its open event reaches us.
        if !status.is_connected() {
            warn!(conn_id = %handle.id(), "Cannot send: signaling connection not yet acknowledged");
            self.counters.send_dropped();
            return Err(SignalError::not_connected(NotConnectedReason::OpenPending));
        }

        let text = match protocol::encode(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(conn_id = %handle.id(), error = %e, "Dropping outbound message");
                self.counters.send_dropped();
                return Err(e);
            }
        };

        let len = text.len();
        if let Err(e) = handle.link().send_text(text) {
            warn!(conn_id = %handle.id(), error = %e, "Dropping outbound message");
            self.counters.send_dropped();
            return Err(e);
        }

        handle.record_sent();
        self.counters.message_tx(len);
        debug!(conn_id = %handle.id(), len, "Message sent");
        Ok(())
    }

    /// Close the connection, if any.
    ///
    /// State is cleared immediately; the transport's own close event for
    /// this handle is ignored when it arrives. Returns whether a connection
    /// was torn down.
    pub fn disconnect(&self) -> bool {
        let mut state = self.state.lock();

        let Some(handle) = state.handle.take() else {
            debug!("No connection to disconnect");
            return false;
        };

        handle.link().close();
        self.set_status(&mut state, ConnectivityStatus::Disconnected);
        self.counters.disconnected();

        info!(conn_id = %handle.id(), "Disconnected from signaling server");
        true
    }

    /// Apply a transport event.
    ///
    /// Events from any handle other than the current one are ignored, which
    /// keeps a late close from clearing a newer connection.
    fn handle_event(&self, id: ConnectionId, event: TransportEvent) {
        let mut state = self.state.lock();

        let is_current = state.handle.as_ref().map(ConnectionHandle::id) == Some(id);
        if !is_current {
            debug!(conn_id = %id, event = event.kind(), "Ignoring event from stale connection");
            self.counters.stale_event();
            return;
        }

        match event {
            TransportEvent::Open => {
                if let Some(handle) = state.handle.as_mut() {
                    handle.mark_open();
                }
                self.set_status(&mut state, ConnectivityStatus::Connected);
                self.counters.connection_opened();
                info!(conn_id = %id, "Connected to signaling server");
            }
            TransportEvent::Message(payload) => {
                if let Some(handle) = state.handle.as_mut() {
                    handle.record_received();
                }
                self.counters.message_rx(payload.len());
                debug!(conn_id = %id, payload = %payload, "Message received");

                state.messages.push(payload.clone());
                // No subscribers is fine
                let _ = self.messages_tx.send(payload);
            }
            TransportEvent::Close { code, reason } => {
                state.handle = None;
                self.set_status(&mut state, ConnectivityStatus::Disconnected);
                self.counters.connection_closed();
                info!(conn_id = %id, ?code, %reason, "Signaling connection closed");
            }
        }
    }

    fn set_status(&self, state: &mut SharedState, status: ConnectivityStatus) {
        state.status = status;
        self.status_tx.send_replace(status);
    }

    fn event_callback(&self) -> EventCallback {
        let weak = self.weak.clone();
        Arc::new(move |id, event| {
            if let Some(manager) = weak.upgrade() {
                manager.handle_event(id, event);
            }
        })
    }

    /// Whether the transport has acknowledged open
    pub fn is_connected(&self) -> bool {
        self.state.lock().status.is_connected()
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.state.lock().status
    }

    pub fn phase(&self) -> ConnectionPhase {
        let state = self.state.lock();
        ConnectionPhase::derive(state.handle.is_some(), state.status)
    }

    /// Whether a connection handle exists (connecting or connected)
    pub fn has_handle(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    /// Snapshot of the inbound message log, in arrival order
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Details of the current connection, if any
    pub fn current_connection(&self) -> Option<ConnectionInfo> {
        let state = self.state.lock();
        state.handle.as_ref().map(|h| h.to_info(state.status))
    }

    /// Watch connectivity changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status_tx.subscribe()
    }

    /// Receive inbound messages as they are logged
    pub fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.messages_tx.subscribe()
    }

    /// Currently configured endpoint
    pub fn endpoint(&self) -> Option<String> {
        self.config.read().endpoint().map(str::to_owned)
    }

    /// Change the endpoint used by the next `connect`
    pub fn set_endpoint(&self, endpoint: Option<String>) {
        self.config.write().endpoint = endpoint;
    }

    pub fn stats(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().handle.take() {
            handle.link().close();
        }
    }
}
