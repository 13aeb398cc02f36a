//! Core transport traits.

use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportResult;
use crate::events::{ConnectionId, Endpoint, TransportEvent};

/// A one-shot unit of work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Receives every event a transport produces, tagged with its connection.
///
/// Implementations are invoked from transport-owned threads. For a single
/// connection, calls are sequential and never overlap.
pub trait InboundDispatcher: Send + Sync {
    /// Delivers one event for `connection`.
    fn dispatch(&self, connection: ConnectionId, event: TransportEvent);
}

/// The byte-level collaborator: opens sockets, writes requests, decodes responses.
///
/// None of these methods block. Outcomes of `open` and `write` are reported
/// asynchronously through the [`InboundDispatcher`] given to `open`, never from
/// inside a call to `open`, `write` or `close`.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Starts connecting `connection` to `endpoint`.
    ///
    /// Every outcome, including failure to connect, is delivered to `inbound`,
    /// and the connection always ends with `Closed` followed by `Unbound`.
    fn open(&self, connection: ConnectionId, endpoint: &Endpoint, inbound: Arc<dyn InboundDispatcher>);

    /// Queues `request` for writing on an open connection.
    fn write(&self, connection: ConnectionId, request: http::Request<()>) -> TransportResult<()>;

    /// Closes `connection`. Closing an unknown or already closed connection is a no-op.
    fn close(&self, connection: ConnectionId);
}

/// Timer service running one-shot delayed tasks.
///
/// A scheduler is owned explicitly: created with the client that uses it and
/// shut down with that client.
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Runs `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task);

    /// Cancels pending tasks and refuses new ones.
    fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that traits can be used as trait objects
    fn _test_transport_object(_t: &dyn Transport) {}
    fn _test_scheduler_object(_s: &dyn Scheduler) {}
    fn _test_dispatcher_object(_d: Arc<dyn InboundDispatcher>) {}
}
