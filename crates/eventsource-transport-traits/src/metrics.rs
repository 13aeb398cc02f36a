//! Stream metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of one event stream's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Total number of connection attempts.
    pub connection_attempts: u64,

    /// Number of attempts that produced a valid event-stream response.
    pub connections: u64,

    /// Number of attempts that failed before or during validation.
    pub failed_connections: u64,

    /// Total number of body bytes received.
    pub bytes_received: u64,

    /// Total number of events dispatched to the handler.
    pub messages_received: u64,

    /// Total number of errors reported to the handler.
    pub errors: u64,

    /// Number of reconnects that were actually scheduled.
    pub reconnects_scheduled: u64,
}

/// A lock-free, atomic structure for metrics updates from the delivery path.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total connection attempts (atomic counter).
    pub connection_attempts: AtomicU64,

    /// Successful connections (atomic counter).
    pub connections: AtomicU64,

    /// Failed connection attempts (atomic counter).
    pub failed_connections: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total messages dispatched (atomic counter).
    pub messages_received: AtomicU64,

    /// Errors surfaced (atomic counter).
    pub errors: AtomicU64,

    /// Reconnects scheduled (atomic counter).
    pub reconnects_scheduled: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `counter` by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Creates a serializable `StreamMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> StreamMetrics {
        StreamMetrics {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_atomic_metrics_default() {
        let metrics = AtomicMetrics::new();
        assert_eq!(metrics.snapshot(), StreamMetrics::default());
    }

    #[test]
    fn test_atomic_metrics_update() {
        let metrics = AtomicMetrics::new();
        metrics.bytes_received.fetch_add(100, Ordering::Relaxed);
        AtomicMetrics::incr(&metrics.messages_received);
        AtomicMetrics::incr(&metrics.messages_received);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_received, 100);
        assert_eq!(snapshot.messages_received, 2);
    }
}
