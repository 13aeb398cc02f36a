//! Caller-implemented callbacks.

use parking_lot::Mutex;

use crate::error::EventSourceError;
use crate::message::MessageEvent;
use crate::pipeline::ConnectionControl;

/// Callbacks invoked by an event source.
///
/// Callbacks run synchronously on the delivery path of the connection that
/// produced them; two callbacks for the same event source never run at once.
/// Handlers may call [`EventSource::close`](crate::EventSource::close) from
/// inside a callback.
pub trait EventSourceHandler: Send + Sync {
    /// Called once per successful (re)connection.
    fn on_connect(&self) {}

    /// Called for every dispatched event. `event_type` is `"message"` unless
    /// the record carried an `event:` field.
    fn on_message(&self, event_type: &str, event: MessageEvent);

    /// Called for connect failures, invalid responses and transport errors.
    fn on_error(&self, error: EventSourceError);
}

/// Handler that records every callback, for tests and debugging.
///
/// It also accepts reconnection hints, so a bare [`EventStreamParser`](crate::EventStreamParser)
/// can be driven with a single collector.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    connects: Mutex<usize>,
    messages: Mutex<Vec<(String, MessageEvent)>>,
    errors: Mutex<Vec<EventSourceError>>,
    reconnect_intervals: Mutex<Vec<i64>>,
    last_event_ids: Mutex<Vec<String>>,
}

impl CollectingHandler {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `on_connect` calls.
    pub fn connect_count(&self) -> usize {
        *self.connects.lock()
    }

    /// All `(event_type, event)` pairs, in dispatch order.
    pub fn messages(&self) -> Vec<(String, MessageEvent)> {
        self.messages.lock().clone()
    }

    /// Dispatched events without their types.
    pub fn message_events(&self) -> Vec<MessageEvent> {
        self.messages.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// All reported errors, in order.
    pub fn errors(&self) -> Vec<EventSourceError> {
        self.errors.lock().clone()
    }

    /// Every reconnect interval the stream requested.
    pub fn reconnect_intervals(&self) -> Vec<i64> {
        self.reconnect_intervals.lock().clone()
    }

    /// Every `id:` value the stream announced.
    pub fn last_event_ids(&self) -> Vec<String> {
        self.last_event_ids.lock().clone()
    }
}

impl EventSourceHandler for CollectingHandler {
    fn on_connect(&self) {
        *self.connects.lock() += 1;
    }

    fn on_message(&self, event_type: &str, event: MessageEvent) {
        self.messages.lock().push((event_type.to_string(), event));
    }

    fn on_error(&self, error: EventSourceError) {
        self.errors.lock().push(error);
    }
}

impl ConnectionControl for CollectingHandler {
    fn set_reconnect_interval(&self, millis: i64) {
        self.reconnect_intervals.lock().push(millis);
    }

    fn set_last_event_id(&self, id: &str) {
        self.last_event_ids.lock().push(id.to_string());
    }
}
