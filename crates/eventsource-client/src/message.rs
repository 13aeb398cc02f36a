//! The dispatched event value.

use std::fmt;

use serde::Serialize;

/// One event dispatched from a stream.
///
/// Immutable once built; equality compares all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MessageEvent {
    data: String,
    last_event_id: Option<String>,
    origin: String,
}

impl MessageEvent {
    /// Creates an event with every field given.
    pub fn new(
        data: impl Into<String>,
        last_event_id: Option<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            last_event_id,
            origin: origin.into(),
        }
    }

    /// Creates an event with no id and an empty origin.
    pub fn from_data(data: impl Into<String>) -> Self {
        Self::new(data, None, "")
    }

    /// Event payload; multi-line data is joined with `\n`.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Id in effect when the event was dispatched.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// URL of the stream the event came from; empty in test contexts.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageEvent{{data='{}', ", self.data)?;
        match &self.last_event_id {
            Some(id) => write!(f, "lastEventId='{id}', ")?,
            None => f.write_str("lastEventId=null, ")?,
        }
        write!(f, "origin='{}'}}", self.origin)
    }
}
