//! Event source configuration.

use http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{EventSourceError, EventSourceResult};

/// Default delay before reconnecting, in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: i64 = 2000;

/// Default bound on unflushed body content, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 32 * 1024;

/// Per-stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSourceConfig {
    /// Initial reconnect delay in milliseconds. Negative disables reconnection.
    ///
    /// The server may change it at runtime with a `retry:` field.
    pub reconnect_interval: i64,

    /// Maximum number of body bytes buffered while waiting for an event boundary.
    pub max_frame_size: usize,

    /// Value for the `Origin` request header. `None` derives `http://<host>`.
    pub origin: Option<String>,

    /// Additional request headers sent on every (re)connect.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL_MS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            origin: None,
            extra_headers: Vec::new(),
        }
    }
}

impl EventSourceConfig {
    /// Sets the initial reconnect delay in milliseconds.
    #[must_use]
    pub fn with_reconnect_interval(mut self, millis: i64) -> Self {
        self.reconnect_interval = millis;
        self
    }

    /// Disables reconnection entirely.
    #[must_use]
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_interval = -1;
        self
    }

    /// Sets the reassembly bound in bytes.
    #[must_use]
    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Overrides the `Origin` header.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Checks the configuration before any connection is made.
    ///
    /// Returns the extra headers parsed into their wire form.
    pub fn validate(&self) -> EventSourceResult<Vec<(HeaderName, HeaderValue)>> {
        if self.max_frame_size == 0 {
            return Err(EventSourceError::Configuration(
                "max_frame_size must be a positive integer: 0".to_string(),
            ));
        }
        self.extra_headers
            .iter()
            .map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    EventSourceError::Configuration(format!("invalid header name: {name:?}"))
                })?;
                let value = HeaderValue::from_str(value).map_err(|_| {
                    EventSourceError::Configuration(format!("invalid value for header {name}"))
                })?;
                Ok((name, value))
            })
            .collect()
    }
}
