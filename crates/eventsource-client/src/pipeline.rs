//! Capability interfaces the stream pipeline is composed from.
//!
//! Each stage implements only what it handles: the reassembler and the parser
//! receive heads and fragments, the supervisor observes connection lifecycle,
//! and the parser reports reconnection hints through [`ConnectionControl`].

use bytes::Bytes;
use eventsource_transport_traits::{ConnectionId, ResponseHead, TransportError};

use crate::error::EventSourceResult;

/// A stage that is told when a new response starts.
pub trait HeadReceiver {
    /// Called with every validated response head, before any of its fragments.
    fn receive_head(&mut self, head: &ResponseHead);
}

/// A stage that consumes response body bytes.
pub trait FragmentReceiver {
    /// Consumes one piece of body. An error is fatal for the current response.
    fn receive_fragment(&mut self, bytes: Bytes, is_final: bool) -> EventSourceResult<()>;
}

/// Observer of a connection's transport lifecycle.
pub trait LifecycleObserver: Send + Sync {
    /// The socket is connected and ready for a request.
    fn on_connected(&self, connection: ConnectionId);

    /// The transport failed on `connection`.
    fn on_exception(&self, connection: ConnectionId, error: TransportError);

    /// `connection` is closed.
    fn on_closed(&self, connection: ConnectionId);
}

/// Resumption hints flowing from the parser back to the connection owner.
pub trait ConnectionControl: Send + Sync {
    /// A `retry:` field asked for a new reconnect delay.
    fn set_reconnect_interval(&self, millis: i64);

    /// An `id:` field was seen; reconnects must resume from it.
    fn set_last_event_id(&self, id: &str);

    /// Whether the response being parsed may still deliver events.
    ///
    /// Checked before every line; once it returns `false` the rest of the
    /// current frame is dropped.
    fn is_active(&self) -> bool {
        true
    }
}
