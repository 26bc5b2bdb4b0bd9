//! WebSocket transport
//!
//! Each link is driven by one spawned task that owns the socket. The link
//! itself only holds the shared ready state and a command channel into
//! that task.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Connector, EventSink, Link, ReadyState, SharedReadyState};
use crate::error::{NotConnectedReason, Result, SignalError};

/// How long to wait for the peer's close frame after we sent ours
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands from the link to its socket task
#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Connector producing WebSocket links
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    runtime: Option<Handle>,
}

impl WebSocketConnector {
    /// Connector that spawns onto the runtime current at `open` time
    pub fn new() -> Self {
        Self { runtime: None }
    }

    /// Connector that always spawns onto the given runtime
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
        }
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current()
                .map_err(|e| SignalError::Transport(format!("no async runtime available: {e}"))),
        }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, endpoint: &str, events: EventSink) -> Result<Box<dyn Link>> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| SignalError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;
        let runtime = self.runtime()?;

        let state = Arc::new(SharedReadyState::new(ReadyState::Connecting));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        runtime.spawn(drive_socket(request, state.clone(), cmd_rx, events));

        Ok(Box::new(WebSocketLink { state, cmd_tx }))
    }
}

/// Handle to a socket task
struct WebSocketLink {
    state: Arc<SharedReadyState>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Link for WebSocketLink {
    fn ready_state(&self) -> ReadyState {
        self.state.load()
    }

    fn send_text(&self, text: String) -> Result<()> {
        let state = self.state.load();
        if state != ReadyState::Open {
            return Err(SignalError::not_connected(NotConnectedReason::NotOpen(state)));
        }
        self.cmd_tx
            .send(Command::Send(text))
            .map_err(|_| SignalError::Transport("socket task has exited".to_string()))
    }

    fn close(&self) {
        match self.state.advance(ReadyState::Closing) {
            ReadyState::Closing | ReadyState::Closed => {}
            _ => {
                // Task may already be gone; the close event has then been sent.
                let _ = self.cmd_tx.send(Command::Close);
            }
        }
    }
}

/// Run one WebSocket connection from handshake to close
async fn drive_socket(
    request: Request,
    state: Arc<SharedReadyState>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: EventSink,
) {
    let conn_id = events.id();
    let uri = request.uri().to_string();

    debug!(%conn_id, endpoint = %uri, "Opening WebSocket");

    let ws = tokio::select! {
        result = connect_async(request) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!(%conn_id, endpoint = %uri, error = %e, "WebSocket handshake failed");
                state.store(ReadyState::Closed);
                events.closed(None, e.to_string());
                return;
            }
        },
        // Only Close can arrive before open; a dropped link counts too.
        _ = cmd_rx.recv() => {
            debug!(%conn_id, "Close requested before handshake completed");
            state.store(ReadyState::Closed);
            events.closed(None, "closed before open");
            return;
        }
    };

    // A close requested while the handshake finished wins over open.
    if state.transition(ReadyState::Connecting, ReadyState::Open) {
        events.opened();
    }

    let (mut write, mut read) = ws.split();
    let mut closing = state.load() != ReadyState::Open;
    if closing {
        let _ = write.send(Message::Close(None)).await;
    }

    let close_deadline = tokio::time::sleep(CLOSE_TIMEOUT);
    tokio::pin!(close_deadline);

    let mut close_code = None;
    let mut close_reason = String::new();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.message(text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(%conn_id, len = data.len(), "Skipping binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_code = Some(u16::from(frame.code));
                        close_reason = frame.reason.as_str().to_owned();
                    }
                    state.advance(ReadyState::Closing);
                    debug!(%conn_id, code = ?close_code, "Peer sent close frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%conn_id, error = %e, "WebSocket read ended");
                    if close_reason.is_empty() {
                        close_reason = e.to_string();
                    }
                    break;
                }
                None => break,
            },
            cmd = cmd_rx.recv(), if !closing => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!(%conn_id, error = %e, "WebSocket write failed");
                        close_reason = e.to_string();
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    closing = true;
                    state.advance(ReadyState::Closing);
                    let _ = write.send(Message::Close(None)).await;
                    close_deadline.as_mut().reset(Instant::now() + CLOSE_TIMEOUT);
                }
            },
            _ = &mut close_deadline, if closing => {
                debug!(%conn_id, "Peer did not acknowledge close in time");
                break;
            }
        }
    }

    state.store(ReadyState::Closed);
    info!(%conn_id, code = ?close_code, reason = %close_reason, "WebSocket closed");
    events.closed(close_code, close_reason);
}
