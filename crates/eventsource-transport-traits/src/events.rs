//! Inbound transport event types.

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version, header};

use crate::error::TransportError;

/// Opaque handle identifying one transport connection.
///
/// Handles are allocated by the connection owner before the transport is asked to
/// open the connection, so every event the transport delivers can be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw connection number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw connection number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Network address and request target of an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address literal, without port.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Request target: path plus optional query.
    pub path: String,
}

impl Endpoint {
    /// `host:port` form used for socket connects.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Decoded HTTP response head, with any body bytes that arrived alongside it.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Response status code.
    pub status: StatusCode,
    /// Protocol version of the status line.
    pub version: Version,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body bytes already decoded together with the head (often empty).
    pub body: Bytes,
}

impl ResponseHead {
    /// Creates a head with no headers and no body.
    pub fn new(status: StatusCode, version: Version) -> Self {
        Self {
            status,
            version,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Returns the `Content-Type` header value if present and valid ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Everything a transport reports about one connection, in delivery order.
///
/// For a given connection, events are delivered sequentially and never overlap:
/// `Connected`, then `Head`, then zero or more `Fragment`s; `Exception` may occur
/// at any point; `Closed` is delivered exactly once, followed by `Unbound`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket is connected; the owner should now write its request.
    Connected,

    /// A response head was decoded.
    Head(ResponseHead),

    /// A piece of the response body.
    Fragment {
        /// Raw body bytes (chunk framing already removed).
        bytes: Bytes,
        /// `true` for the last fragment of the response.
        is_final: bool,
    },

    /// The transport hit an error on this connection.
    Exception(TransportError),

    /// The connection is closed, for whatever reason.
    Closed,

    /// The transport released every resource tied to this connection.
    Unbound,
}

impl TransportEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Head(_) => "head",
            Self::Fragment { .. } => "fragment",
            Self::Exception(_) => "exception",
            Self::Closed => "closed",
            Self::Unbound => "unbound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint {
            host: "host.com".to_string(),
            port: 99,
            path: "/foo?x=1".to_string(),
        };
        assert_eq!(endpoint.to_string(), "http://host.com:99/foo?x=1");
        assert_eq!(endpoint.authority(), "host.com:99");
    }

    #[test]
    fn test_response_head_content_type() {
        let mut head = ResponseHead::new(StatusCode::OK, Version::HTTP_11);
        assert_eq!(head.content_type(), None);

        head.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        );
        assert_eq!(head.content_type(), Some("text/event-stream"));
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).get(), 7);
    }
}
