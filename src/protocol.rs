//! Outbound message encoding
//!
//! Signaling frames are UTF-8 JSON text. By convention every message is an
//! object carrying a `type` string and an arbitrary `payload`, but no schema
//! is enforced: anything `Serialize` can be sent. Inbound frames are kept as
//! opaque text and never parsed here.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Message type sent by the liveness check
pub const PING: &str = "ping";

/// Conventional signaling envelope: `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl SignalMessage {
    /// Build a message from any serializable payload
    pub fn new(kind: impl Into<String>, payload: impl Serialize) -> Result<Self> {
        Ok(Self {
            kind: kind.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// A `ping` carrying a text payload
    pub fn ping(text: impl Into<String>) -> Self {
        Self {
            kind: PING.to_string(),
            payload: Value::String(text.into()),
        }
    }
}

/// Serialize an outbound value to frame text
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}
