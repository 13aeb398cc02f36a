//! Error kinds surfaced to [`EventSourceHandler::on_error`](crate::EventSourceHandler::on_error).

use eventsource_transport_traits::TransportError;
use thiserror::Error;

/// A specialized `Result` type for construction-time operations.
pub type EventSourceResult<T> = std::result::Result<T, EventSourceError>;

/// Errors reported by an event source.
///
/// Apart from [`EventSourceError::Configuration`], which is returned when an
/// event source is built, every variant reaches the caller through the handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventSourceError {
    /// The transport could not establish a connection.
    #[error("Failed to connect to {url}: {source}")]
    ConnectFailure {
        /// Stream URL that was being connected.
        url: String,
        /// Underlying transport cause.
        #[source]
        source: TransportError,
    },

    /// The server answered, but not with a usable event stream.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Unflushed body content grew past the configured bound.
    #[error("Frame too large: {size} bytes buffered, maximum is {max} bytes")]
    FrameTooLarge {
        /// Size the buffer would have reached.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Any other transport failure during an active connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The event source was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EventSourceError {
    /// Classifies a transport failure for `url`.
    pub fn from_transport(url: &str, err: TransportError) -> Self {
        if err.is_connect_failure() {
            Self::ConnectFailure {
                url: url.to_string(),
                source: err,
            }
        } else {
            Self::Transport(err)
        }
    }
}
