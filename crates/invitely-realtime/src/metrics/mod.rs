//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level counters, updated lock-free from connection and relay tasks.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    handshakes_rejected: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    parse_failures: AtomicU64,
    notifications_published: AtomicU64,
    publish_failures: AtomicU64,
    slow_consumer_disconnects: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

impl RealtimeMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection reached `OPEN`.
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection left the registry.
    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// A handshake was refused with 4001/4003.
    pub fn handshake_rejected(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame was processed.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// `count` frames were queued for delivery.
    pub fn messages_sent(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    /// An inbound frame could not be parsed.
    pub fn parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The dispatcher handed a message to the bus.
    pub fn notification_published(&self) {
        self.notifications_published.fetch_add(1, Ordering::Relaxed);
    }

    /// The bus refused a publish.
    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A client was cut off for not draining its queue.
    pub fn slow_consumer(&self) {
        self.slow_consumer_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection missed its heartbeat window.
    pub fn heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            handshakes_rejected: self.handshakes_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            notifications_published: self.notifications_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            slow_consumer_disconnects: self.slow_consumer_disconnects.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connections ever opened.
    pub connections_total: u64,
    /// Connections currently open.
    pub connections_active: u64,
    /// Handshakes refused for bad credentials or role.
    pub handshakes_rejected: u64,
    /// Inbound frames processed.
    pub messages_received: u64,
    /// Outbound frames queued.
    pub messages_sent: u64,
    /// Malformed inbound frames.
    pub parse_failures: u64,
    /// Messages handed to the bus.
    pub notifications_published: u64,
    /// Publishes the bus refused.
    pub publish_failures: u64,
    /// Slow-consumer disconnects.
    pub slow_consumer_disconnects: u64,
    /// Heartbeat timeouts.
    pub heartbeat_timeouts: u64,
}
