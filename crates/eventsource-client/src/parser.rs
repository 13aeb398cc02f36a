//! Event stream parser
//!
//! Decodes the Server-Sent Events line grammar:
//! - an empty line dispatches the pending event, if any data was seen
//! - lines starting with `:` are comments
//! - `field: value` assigns a field (one leading space of the value is dropped)
//! - `field` alone assigns an empty value
//!
//! `data` accumulates (joined with `\n`), `event` applies to one dispatch only,
//! `id` is sticky and reported to the connection immediately, `retry` changes
//! the reconnect delay when its value is all ASCII digits.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use eventsource_transport_traits::ResponseHead;
use tracing::{debug, trace};

use crate::error::EventSourceResult;
use crate::handler::EventSourceHandler;
use crate::message::MessageEvent;
use crate::pipeline::{ConnectionControl, FragmentReceiver, HeadReceiver};

/// Event type used when a record carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Incremental decoder turning stream lines into handler callbacks.
pub struct EventStreamParser {
    origin: String,
    handler: Arc<dyn EventSourceHandler>,
    control: Arc<dyn ConnectionControl>,
    pending_data: Option<String>,
    pending_event_type: String,
    pending_last_event_id: Option<String>,
}

impl fmt::Debug for EventStreamParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStreamParser")
            .field("origin", &self.origin)
            .field("pending_data", &self.pending_data)
            .field("pending_event_type", &self.pending_event_type)
            .field("pending_last_event_id", &self.pending_last_event_id)
            .finish()
    }
}

impl EventStreamParser {
    /// Creates a parser for the stream at `origin`.
    pub fn new(
        origin: impl Into<String>,
        handler: Arc<dyn EventSourceHandler>,
        control: Arc<dyn ConnectionControl>,
    ) -> Self {
        Self {
            origin: origin.into(),
            handler,
            control,
            pending_data: None,
            pending_event_type: DEFAULT_EVENT_TYPE.to_string(),
            pending_last_event_id: None,
        }
    }

    /// Feeds every line of `text`, in order. Lines end with `\n` or `\r\n`.
    ///
    /// Returns the number of events dispatched.
    pub fn feed_block(&mut self, text: &str) -> usize {
        let mut dispatched = 0;
        for line in text.lines() {
            if !self.control.is_active() {
                debug!("Stream no longer active, dropping rest of frame");
                break;
            }
            if self.feed_line(line) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Applies one line. Returns `true` if it dispatched an event.
    pub fn feed_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            trace!("Ignoring comment line");
            return false;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line.trim(), ""),
        };

        match field {
            "data" => match self.pending_data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.pending_data = Some(value.to_string()),
            },
            "id" => {
                self.pending_last_event_id = Some(value.to_string());
                self.control.set_last_event_id(value);
            }
            "event" => self.pending_event_type = value.to_string(),
            "retry" => {
                if let Some(millis) = parse_retry(value) {
                    debug!("Server requested reconnect interval of {}ms", millis);
                    self.control.set_reconnect_interval(millis);
                } else {
                    trace!("Ignoring malformed retry value {:?}", value);
                }
            }
            other => trace!("Ignoring unknown field {:?}", other),
        }

        false
    }

    /// Id that will be attached to the next dispatched event.
    pub fn last_event_id(&self) -> Option<&str> {
        self.pending_last_event_id.as_deref()
    }

    fn dispatch(&mut self) -> bool {
        let event_type = std::mem::replace(
            &mut self.pending_event_type,
            DEFAULT_EVENT_TYPE.to_string(),
        );
        let Some(data) = self.pending_data.take() else {
            return false;
        };

        let event = MessageEvent::new(data, self.pending_last_event_id.clone(), &self.origin);
        self.handler.on_message(&event_type, event);
        true
    }
}

/// A new response starts a new record: half-accumulated fields are dropped,
/// the sticky id is kept.
impl HeadReceiver for EventStreamParser {
    fn receive_head(&mut self, _head: &ResponseHead) {
        self.pending_data = None;
        self.pending_event_type = DEFAULT_EVENT_TYPE.to_string();
    }
}

impl FragmentReceiver for EventStreamParser {
    fn receive_fragment(&mut self, bytes: Bytes, _is_final: bool) -> EventSourceResult<()> {
        let text = String::from_utf8_lossy(&bytes);
        self.feed_block(&text);
        Ok(())
    }
}

fn parse_retry(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
