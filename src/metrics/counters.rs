//! Atomic counters for connection activity
//!
//! Lock-free counters that can be safely updated from any thread.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters, one set per connection manager
#[derive(Debug, Default)]
pub struct Counters {
    // Connection lifecycle
    pub connects_started: AtomicU64,
    pub connects_failed: AtomicU64,
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub disconnects: AtomicU64,

    // Traffic
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Errors
    pub sends_dropped: AtomicU64,
    pub stale_events: AtomicU64,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            connects_started: AtomicU64::new(0),
            connects_failed: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            sends_dropped: AtomicU64::new(0),
            stale_events: AtomicU64::new(0),
        }
    }

    // Connection tracking
    #[inline]
    pub fn connect_started(&self) {
        self.connects_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connect_failed(&self) {
        self.connects_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic tracking
    #[inline]
    pub fn message_rx(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_tx(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    // Error tracking
    #[inline]
    pub fn send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stale_event(&self) {
        self.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            connects_started: self.connects_started.load(Ordering::Relaxed),
            connects_failed: self.connects_failed.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counters for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub connects_started: u64,
    pub connects_failed: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub disconnects: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub sends_dropped: u64,
    pub stale_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_counters() {
        let counters = Counters::new();
        counters.message_rx(4);
        counters.message_rx(6);
        counters.message_tx(30);

        let snap = counters.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.bytes_received, 10);
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(snap.bytes_sent, 30);
        assert_eq!(snap.sends_dropped, 0);
    }
}
