//! Transport abstraction
//!
//! A [`Connector`] opens a [`Link`] to the signaling endpoint and reports the
//! link's lifecycle through an [`EventSink`]. The connection manager only
//! talks to these traits; [`WebSocketConnector`] is the production transport.

mod websocket;

pub use websocket::WebSocketConnector;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::connection::ConnectionId;
use crate::error::Result;

/// Readiness of a transport link (WebSocket semantics)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Handshake in progress
    Connecting,
    /// Frames can be exchanged
    Open,
    /// Close requested, waiting for the peer
    Closing,
    /// Link is gone
    Closed,
}

impl ReadyState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Ready state shared between a link and the task driving it
#[derive(Debug)]
pub struct SharedReadyState(AtomicU8);

impl SharedReadyState {
    pub fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ReadyState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `from` to `to`; false if the state was something else
    pub fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `next` unless already at or past it; returns the previous state
    pub fn advance(&self, next: ReadyState) -> ReadyState {
        ReadyState::from_u8(self.0.fetch_max(next.as_u8(), Ordering::AcqRel))
    }
}

/// Lifecycle event reported by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is open
    Open,
    /// An inbound text payload
    Message(String),
    /// The link closed, for whatever reason
    Close {
        /// Close code sent by the peer, if any
        code: Option<u16>,
        /// Close reason or failure description
        reason: String,
    },
}

impl TransportEvent {
    /// Short name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Close { .. } => "close",
        }
    }
}

/// Callback receiving link events
pub type EventCallback = Arc<dyn Fn(ConnectionId, TransportEvent) + Send + Sync>;

/// Where a link reports its events, tagged with the link's connection id
#[derive(Clone)]
pub struct EventSink {
    id: ConnectionId,
    callback: EventCallback,
}

impl EventSink {
    pub fn new(id: ConnectionId, callback: EventCallback) -> Self {
        Self { id, callback }
    }

    /// Connection this sink reports for
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.callback)(self.id, event);
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Open);
    }

    pub fn message(&self, payload: impl Into<String>) {
        self.emit(TransportEvent::Message(payload.into()));
    }

    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        self.emit(TransportEvent::Close {
            code,
            reason: reason.into(),
        });
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("id", &self.id).finish()
    }
}

/// An open (or opening) transport link
pub trait Link: Send + Sync {
    /// Current readiness
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame. Fails unless the link is open.
    fn send_text(&self, text: String) -> Result<()>;

    /// Request closure. The close event follows asynchronously.
    fn close(&self);
}

/// Opens links to a signaling endpoint.
///
/// `open` must return before any event is delivered through `events`: the
/// manager stores the returned link while holding its state lock, and the
/// sink takes that same lock.
pub trait Connector: Send + Sync {
    fn open(&self, endpoint: &str, events: EventSink) -> Result<Box<dyn Link>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_ready_state_advance() {
        let state = SharedReadyState::new(ReadyState::Connecting);
        assert_eq!(state.advance(ReadyState::Open), ReadyState::Connecting);
        assert_eq!(state.load(), ReadyState::Open);

        state.advance(ReadyState::Closed);
        // Never moves backwards
        assert_eq!(state.advance(ReadyState::Closing), ReadyState::Closed);
        assert_eq!(state.load(), ReadyState::Closed);
    }

    #[test]
    fn test_ready_state_transition() {
        let state = SharedReadyState::new(ReadyState::Connecting);
        state.advance(ReadyState::Closing);
        assert!(!state.transition(ReadyState::Connecting, ReadyState::Open));
        assert_eq!(state.load(), ReadyState::Closing);
    }

    #[test]
    fn test_sink_tags_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let sink = EventSink::new(
            ConnectionId::from_raw(7),
            Arc::new(move |id, event| recorder.lock().push((id, event))),
        );

        sink.opened();
        sink.message("hello");
        sink.closed(Some(1000), "bye");

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(id, _)| id.as_u64() == 7));
        assert_eq!(seen[1].1, TransportEvent::Message("hello".to_string()));
        assert_eq!(seen[2].1.kind(), "close");
    }
}
