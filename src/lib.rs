//! P2P Transfer signaling client
//!
//! Maintains a single connection to the signaling server, sends JSON
//! signaling messages over it, and keeps an ordered log of everything the
//! server sends back.

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod transport;
pub mod util;

pub use config::Config;
pub use connection::{ConnectOutcome, ConnectionManager, ConnectivityStatus};
pub use error::{Result, SignalError};
pub use protocol::SignalMessage;

/// Client version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
