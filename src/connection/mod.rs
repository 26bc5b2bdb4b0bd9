//! Connection management
//!
//! Handles the signaling connection's state, lifecycle, and inbound log.

mod manager;
mod state;

pub use manager::{ConnectOutcome, ConnectionManager};
pub use state::{
    ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionPhase, ConnectivityStatus,
};
