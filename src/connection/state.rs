//! Connection state

use serde::Serialize;
use std::time::Instant;

use crate::transport::{Link, ReadyState};

/// Unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Whether the signaling channel is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectivityStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectivityStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Manager lifecycle phase, derived from handle presence and status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    /// No handle
    Disconnected,
    /// Handle exists, open not yet acknowledged
    Connecting,
    /// Transport acknowledged open
    Connected,
}

impl ConnectionPhase {
    pub fn derive(has_handle: bool, status: ConnectivityStatus) -> Self {
        match (has_handle, status) {
            (true, ConnectivityStatus::Connected) => Self::Connected,
            (true, ConnectivityStatus::Disconnected) => Self::Connecting,
            (false, _) => Self::Disconnected,
        }
    }
}

/// The manager's reference to its active transport link
pub struct ConnectionHandle {
    /// Unique identifier
    id: ConnectionId,
    /// Endpoint the link was opened against
    endpoint: String,
    /// Transport link
    link: Box<dyn Link>,
    /// When `connect` created this handle
    created_at: Instant,
    /// When the transport acknowledged open
    opened_at: Option<Instant>,
    /// Inbound messages seen on this link
    messages_received: u64,
    /// Outbound messages handed to this link
    messages_sent: u64,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, endpoint: String, link: Box<dyn Link>) -> Self {
        Self {
            id,
            endpoint,
            link,
            created_at: Instant::now(),
            opened_at: None,
            messages_received: 0,
            messages_sent: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn link(&self) -> &dyn Link {
        self.link.as_ref()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.link.ready_state()
    }

    /// Record the open acknowledgment
    pub fn mark_open(&mut self) {
        self.opened_at.get_or_insert_with(Instant::now);
    }

    pub fn record_received(&mut self) {
        self.messages_received = self.messages_received.saturating_add(1);
    }

    pub fn record_sent(&mut self) {
        self.messages_sent = self.messages_sent.saturating_add(1);
    }

    /// Time since `connect` created the handle
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Convert to serializable info
    pub fn to_info(&self, status: ConnectivityStatus) -> ConnectionInfo {
        ConnectionInfo {
            id: format!("{}", self.id),
            endpoint: self.endpoint.clone(),
            phase: ConnectionPhase::derive(true, status),
            ready_state: self.ready_state().to_string(),
            age_secs: self.age().as_secs_f64(),
            open_secs: self.opened_at.map(|t| t.elapsed().as_secs_f64()),
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// Serializable connection information for display
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection ID (hex string)
    pub id: String,
    /// Signaling endpoint
    pub endpoint: String,
    /// Manager phase
    pub phase: ConnectionPhase,
    /// Transport ready state
    pub ready_state: String,
    /// Seconds since connect
    pub age_secs: f64,
    /// Seconds since open, if open was acknowledged
    pub open_secs: Option<f64>,
    /// Inbound messages on this connection
    pub messages_received: u64,
    /// Outbound messages on this connection
    pub messages_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_derivation() {
        assert_eq!(
            ConnectionPhase::derive(false, ConnectivityStatus::Disconnected),
            ConnectionPhase::Disconnected
        );
        assert_eq!(
            ConnectionPhase::derive(true, ConnectivityStatus::Disconnected),
            ConnectionPhase::Connecting
        );
        assert_eq!(
            ConnectionPhase::derive(true, ConnectivityStatus::Connected),
            ConnectionPhase::Connected
        );
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::from_raw(255).to_string(), "00000000000000ff");
    }
}
