//! Error types for the signaling client

use std::fmt;

use crate::transport::ReadyState;

/// Result alias for signaling operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Why an outbound message could not be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotConnectedReason {
    /// No connection handle exists
    NoConnection,
    /// A handle exists but the transport is not open
    NotOpen(ReadyState),
    /// The transport is open but its open event has not been applied yet
    OpenPending,
}

impl fmt::Display for NotConnectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnection => write!(f, "no connection"),
            Self::NotOpen(state) => write!(f, "transport is {state}"),
            Self::OpenPending => write!(f, "transport open not yet acknowledged"),
        }
    }
}

/// Errors reported by the connection manager
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The signaling endpoint is not configured
    #[error("signaling endpoint is not configured (set signaling.endpoint or {env})", env = crate::config::ENDPOINT_ENV)]
    Configuration,

    /// A send was attempted without an open transport
    #[error("cannot send: {reason}")]
    NotConnected { reason: NotConnectedReason },

    /// The outbound value could not be serialized
    #[error("failed to serialize outbound message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport could not be opened or has gone away
    #[error("transport error: {0}")]
    Transport(String),
}

impl SignalError {
    /// Shorthand for a not-connected error
    pub fn not_connected(reason: NotConnectedReason) -> Self {
        Self::NotConnected { reason }
    }

    /// Check whether this is a not-connected error
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}
