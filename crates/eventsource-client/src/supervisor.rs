//! Connection supervision: one logical event stream over many physical connections.
//!
//! An [`EventSource`] owns at most one live transport connection at a time. It
//! writes the GET request when the socket connects, validates the response
//! head, feeds the body through the reassembly and parsing pipeline, and turns
//! every unexpected close into a single scheduled reconnect that resumes from
//! the last seen event id.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use eventsource_transport_traits::{
    AtomicMetrics, ConnectionId, Endpoint, ResponseHead, StreamMetrics, TransportError,
    TransportEvent,
};
use http::{HeaderName, HeaderValue, Method, Request, StatusCode, Version, header};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::client::ClientShared;
use crate::config::EventSourceConfig;
use crate::error::{EventSourceError, EventSourceResult};
use crate::handler::EventSourceHandler;
use crate::message::MessageEvent;
use crate::parser::EventStreamParser;
use crate::pipeline::{ConnectionControl, FragmentReceiver, HeadReceiver, LifecycleObserver};
use crate::reassembler::ChunkReassembler;

const EVENT_STREAM: &str = "text/event-stream";
const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Lifecycle of an [`EventSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// No connection and none pending. Also reached when reconnection is disabled.
    Idle,
    /// A connection was requested and its response is not yet validated.
    Connecting,
    /// A valid event stream is being received.
    Connected,
    /// A reconnect timer is pending.
    ReconnectScheduled,
    /// Closed by the caller. Terminal.
    Closed,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectScheduled => "reconnect-scheduled",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State shared between the supervisor and its parser.
#[derive(Debug, Default)]
struct StreamControl {
    reconnect_interval: AtomicI64,
    last_event_id: Mutex<Option<String>>,
    // Raw id of the connection allowed to deliver events, 0 for none.
    live: AtomicU64,
    // Raw id of the connection whose bytes are in the pipeline.
    feeding: AtomicU64,
}

impl StreamControl {
    fn set_live(&self, connection: Option<ConnectionId>) {
        self.live
            .store(connection.map_or(0, ConnectionId::get), Ordering::Release);
    }
}

impl ConnectionControl for StreamControl {
    fn set_reconnect_interval(&self, millis: i64) {
        debug!("Reconnect interval set to {}ms", millis);
        self.reconnect_interval.store(millis, Ordering::Release);
    }

    fn set_last_event_id(&self, id: &str) {
        *self.last_event_id.lock() = Some(id.to_string());
    }

    fn is_active(&self) -> bool {
        let feeding = self.feeding.load(Ordering::Acquire);
        feeding != 0 && self.live.load(Ordering::Acquire) == feeding
    }
}

/// Handler decorator that keeps the stream counters current.
struct Metered {
    inner: Arc<dyn EventSourceHandler>,
    metrics: Arc<AtomicMetrics>,
}

impl EventSourceHandler for Metered {
    fn on_connect(&self) {
        self.inner.on_connect();
    }

    fn on_message(&self, event_type: &str, event: MessageEvent) {
        AtomicMetrics::incr(&self.metrics.messages_received);
        self.inner.on_message(event_type, event);
    }

    fn on_error(&self, error: EventSourceError) {
        AtomicMetrics::incr(&self.metrics.errors);
        self.inner.on_error(error);
    }
}

/// The connection this source currently owns.
#[derive(Debug, Clone, Copy)]
struct Active {
    id: ConnectionId,
    // Set once the response is rejected; remaining body is dropped until close.
    discarding: bool,
}

/// A supervised event stream.
///
/// Created by [`EventSourceClient::event_source`](crate::EventSourceClient::event_source)
/// and started with [`connect`](Self::connect). After an unexpected close the
/// source reconnects on its own, after the current reconnect interval, until
/// [`close`](Self::close) is called or the interval is negative.
pub struct EventSource {
    url: String,
    endpoint: Endpoint,
    origin_header: HeaderValue,
    host_header: HeaderValue,
    extra_headers: Vec<(HeaderName, HeaderValue)>,
    handler: Arc<dyn EventSourceHandler>,
    shared: Arc<ClientShared>,
    control: Arc<StreamControl>,
    pipeline: Mutex<ChunkReassembler<EventStreamParser>>,
    current: Mutex<Option<Active>>,
    state: watch::Sender<SupervisorState>,
    closed: AtomicBool,
    reconnecting: AtomicBool,
    metrics: Arc<AtomicMetrics>,
    this: Weak<EventSource>,
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("reconnect_interval", &self.reconnect_interval())
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

impl EventSource {
    pub(crate) fn new(
        url: &url::Url,
        handler: Arc<dyn EventSourceHandler>,
        config: EventSourceConfig,
        shared: Arc<ClientShared>,
    ) -> EventSourceResult<Arc<Self>> {
        let extra_headers = config.validate()?;
        let endpoint = endpoint_of(url)?;

        let origin = config
            .origin
            .clone()
            .unwrap_or_else(|| format!("http://{}", endpoint.host));
        let origin_header = HeaderValue::from_str(&origin)
            .map_err(|_| EventSourceError::Configuration(format!("invalid origin: {origin}")))?;
        let host_header = HeaderValue::from_str(&endpoint.host).map_err(|_| {
            EventSourceError::Configuration(format!("invalid host: {}", endpoint.host))
        })?;

        let metrics = Arc::new(AtomicMetrics::new());
        let handler: Arc<dyn EventSourceHandler> = Arc::new(Metered {
            inner: handler,
            metrics: Arc::clone(&metrics),
        });
        let control = Arc::new(StreamControl {
            reconnect_interval: AtomicI64::new(config.reconnect_interval),
            ..StreamControl::default()
        });
        let parser = EventStreamParser::new(
            url.as_str(),
            Arc::clone(&handler),
            Arc::clone(&control) as Arc<dyn ConnectionControl>,
        );
        let pipeline = ChunkReassembler::new(config.max_frame_size, parser);
        let (state, _) = watch::channel(SupervisorState::Idle);

        Ok(Arc::new_cyclic(|this| Self {
            url: url.as_str().to_string(),
            endpoint,
            origin_header,
            host_header,
            extra_headers,
            handler,
            shared,
            control,
            pipeline: Mutex::new(pipeline),
            current: Mutex::new(None),
            state,
            closed: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            metrics,
            this: this.clone(),
        }))
    }

    /// The stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Where connections are opened.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Delay before the next reconnect, in milliseconds. Negative means never.
    pub fn reconnect_interval(&self) -> i64 {
        self.control.reconnect_interval.load(Ordering::Acquire)
    }

    /// Changes the reconnect delay. Negative disables reconnection.
    pub fn set_reconnect_interval(&self, millis: i64) {
        self.control.set_reconnect_interval(millis);
    }

    /// Id the next connection resumes from.
    pub fn last_event_id(&self) -> Option<String> {
        self.control.last_event_id.lock().clone()
    }

    /// Handle of the connection currently owned, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        (*self.current.lock()).map(|active| active.id)
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> StreamMetrics {
        self.metrics.snapshot()
    }

    /// Opens a new connection and returns its handle.
    ///
    /// Any connection still owned is closed first. Returns `None` once the
    /// source is closed.
    pub fn connect(&self) -> Option<ConnectionId> {
        let this = self.this.upgrade()?;
        let mut current = self.current.lock();
        if self.is_closed() {
            debug!("Not connecting {}: event source is closed", self.url);
            return None;
        }

        let id = self.shared.registry.register(this);
        let previous = current.replace(Active {
            id,
            discarding: false,
        });
        self.control.set_live(Some(id));
        if let Some(previous) = previous {
            debug!("Replacing {} with {}", previous.id, id);
            self.shared.transport.close(previous.id);
        }

        self.transition(SupervisorState::Connecting);
        AtomicMetrics::incr(&self.metrics.connection_attempts);
        info!("Connecting to {} ({})", self.url, id);

        // The lock is held across `open` so a concurrent `close` sees the handle.
        let inbound = Arc::clone(&self.shared);
        self.shared.transport.open(id, &self.endpoint, inbound);
        Some(id)
    }

    /// Stops the stream for good: no further connects or reconnects.
    ///
    /// Idempotent, and safe to call from inside handler callbacks.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let active = {
            let mut current = self.current.lock();
            self.control.set_live(None);
            self.state.send_replace(SupervisorState::Closed);
            current.take()
        };
        info!("Closed event source {}", self.url);
        if let Some(active) = active {
            self.shared.transport.close(active.id);
        }
    }

    /// Receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Waits until the source is closed.
    pub async fn join(&self) {
        let mut state = self.subscribe();
        // The sender lives as long as `self`, so this only returns on `Closed`.
        let _ = state
            .wait_for(|state| *state == SupervisorState::Closed)
            .await;
    }

    pub(crate) fn handle_event(&self, connection: ConnectionId, event: TransportEvent) {
        trace!("{} event on {}", event.kind(), connection);
        match event {
            TransportEvent::Connected => self.on_connected(connection),
            TransportEvent::Head(head) => self.on_head(connection, head),
            TransportEvent::Fragment { bytes, is_final } => {
                self.on_fragment(connection, bytes, is_final);
            }
            TransportEvent::Exception(error) => self.on_exception(connection, error),
            TransportEvent::Closed => self.on_closed(connection),
            TransportEvent::Unbound => {}
        }
    }

    fn transition(&self, next: SupervisorState) {
        self.state.send_if_modified(|state| {
            if *state == SupervisorState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// `Some(discarding)` if `connection` is the one currently owned.
    fn status_of(&self, connection: ConnectionId) -> Option<bool> {
        (*self.current.lock())
            .filter(|active| active.id == connection)
            .map(|active| active.discarding)
    }

    fn reject(&self, connection: ConnectionId) {
        if let Some(active) = self.current.lock().as_mut()
            && active.id == connection
        {
            active.discarding = true;
            self.control.set_live(None);
        }
    }

    /// Reports `error` and tears `connection` down; the close drives the reconnect.
    fn fail(&self, connection: ConnectionId, error: EventSourceError) {
        self.reject(connection);
        self.handler.on_error(error);
        self.shared.transport.close(connection);
    }

    fn request(&self) -> EventSourceResult<Request<()>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(self.endpoint.path.as_str())
            .version(Version::HTTP_11)
            .header(header::ACCEPT, EVENT_STREAM)
            .header(header::HOST, self.host_header.clone())
            .header(header::ORIGIN, self.origin_header.clone())
            .header(header::CACHE_CONTROL, "no-cache");

        if let Some(id) = self.last_event_id() {
            match HeaderValue::from_str(&id) {
                Ok(value) => builder = builder.header(LAST_EVENT_ID, value),
                Err(_) => warn!("Last event id {:?} is not a valid header value, not resuming", id),
            }
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.clone(), value.clone());
        }

        builder.body(()).map_err(|e| {
            EventSourceError::Transport(TransportError::Internal(format!(
                "failed to build request: {e}"
            )))
        })
    }

    fn validate(head: &ResponseHead) -> EventSourceResult<()> {
        if head.status != StatusCode::OK {
            return Err(EventSourceError::ProtocolError(format!(
                "unexpected status: {}",
                head.status
            )));
        }
        if head.version != Version::HTTP_11 {
            return Err(EventSourceError::ProtocolError(format!(
                "unexpected protocol version: {:?}",
                head.version
            )));
        }
        match head.content_type() {
            Some(EVENT_STREAM) => Ok(()),
            other => Err(EventSourceError::ProtocolError(format!(
                "unexpected content type: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    fn on_head(&self, connection: ConnectionId, head: ResponseHead) {
        let validated = Self::validate(&head);
        {
            let mut pipeline = self.pipeline.lock();
            if self.status_of(connection) != Some(false) {
                debug!("Ignoring response head on {}", connection);
                return;
            }
            if validated.is_ok() {
                pipeline.receive_head(&head);
            }
        }

        if let Err(error) = validated {
            warn!("Rejecting response from {}: {}", self.url, error);
            AtomicMetrics::incr(&self.metrics.failed_connections);
            self.fail(connection, error);
            return;
        }

        self.transition(SupervisorState::Connected);
        AtomicMetrics::incr(&self.metrics.connections);
        info!("Connected to {}", self.url);
        self.handler.on_connect();

        if !head.body.is_empty() {
            self.on_fragment(connection, head.body, false);
        }
    }

    fn on_fragment(&self, connection: ConnectionId, bytes: Bytes, is_final: bool) {
        // Handler callbacks run under the pipeline lock. `current` may be taken
        // while holding it, never the other way round.
        let result = {
            let mut pipeline = self.pipeline.lock();
            match self.status_of(connection) {
                Some(false) => {}
                Some(true) => {
                    trace!("Discarding {} bytes of rejected response", bytes.len());
                    return;
                }
                None => {
                    debug!("Ignoring fragment on stale {}", connection);
                    return;
                }
            }

            self.metrics
                .bytes_received
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
            self.control
                .feeding
                .store(connection.get(), Ordering::Release);
            pipeline.receive_fragment(bytes, is_final)
        };
        if let Err(error) = result {
            self.fail(connection, error);
        }
    }

    fn reconnect(&self) {
        if self.is_closed() {
            return;
        }

        let interval = self.reconnect_interval();
        if interval < 0 {
            info!("Reconnection disabled for {}, won't retry", self.url);
            self.transition(SupervisorState::Idle);
            return;
        }

        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnect to {} already scheduled", self.url);
            self.transition(SupervisorState::ReconnectScheduled);
            return;
        }
        let Some(this) = self.this.upgrade() else {
            self.reconnecting.store(false, Ordering::Release);
            return;
        };

        let delay = Duration::from_millis(interval.unsigned_abs());
        self.transition(SupervisorState::ReconnectScheduled);
        AtomicMetrics::incr(&self.metrics.reconnects_scheduled);
        warn!("Reconnecting to {} in {}ms", self.url, interval);

        self.shared.scheduler.schedule(
            delay,
            Box::new(move || {
                this.reconnecting.store(false, Ordering::Release);
                if this.is_closed() {
                    debug!("Reconnect timer fired after close, ignoring");
                    return;
                }
                this.connect();
            }),
        );
    }
}

impl LifecycleObserver for EventSource {
    fn on_connected(&self, connection: ConnectionId) {
        if self.status_of(connection).is_none() {
            debug!("Ignoring connect of stale {}", connection);
            return;
        }

        let written = self.request().and_then(|request| {
            self.shared
                .transport
                .write(connection, request)
                .map_err(EventSourceError::Transport)
        });
        match written {
            Ok(()) => debug!("Sent event stream request on {}", connection),
            Err(error) => self.fail(connection, error),
        }
    }

    fn on_exception(&self, connection: ConnectionId, error: TransportError) {
        if self.status_of(connection).is_none() {
            debug!("Ignoring exception on stale {}: {}", connection, error);
            return;
        }

        let error = EventSourceError::from_transport(&self.url, error);
        if matches!(error, EventSourceError::ConnectFailure { .. }) {
            AtomicMetrics::incr(&self.metrics.failed_connections);
        }
        warn!("Event stream error on {}: {}", connection, error);
        self.fail(connection, error);
    }

    fn on_closed(&self, connection: ConnectionId) {
        let owned = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|active| active.id == connection) {
                *current = None;
                self.control.set_live(None);
                true
            } else {
                false
            }
        };
        if !owned {
            debug!("Ignoring close of stale {}", connection);
            return;
        }

        self.pipeline.lock().reset();
        if self.is_closed() {
            return;
        }
        info!("Event stream {} disconnected", self.url);
        self.transition(SupervisorState::Idle);
        self.reconnect();
    }
}

fn endpoint_of(url: &url::Url) -> EventSourceResult<Endpoint> {
    if url.scheme() != "http" {
        return Err(EventSourceError::Configuration(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| EventSourceError::Configuration(format!("missing host: {url}")))?;
    Ok(Endpoint {
        host: host.to_string(),
        port: url.port_or_known_default().unwrap_or(80),
        path: url[url::Position::BeforePath..url::Position::AfterQuery].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> url::Url {
        url::Url::parse(url).unwrap()
    }

    fn head(status: StatusCode, version: Version, content_type: Option<&str>) -> ResponseHead {
        let mut head = ResponseHead::new(status, version);
        if let Some(ct) = content_type {
            head.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        head
    }

    #[test]
    fn test_endpoint_defaults_port_and_keeps_query() {
        let endpoint = endpoint_of(&parse("http://example.com/stream?topic=a")).unwrap();
        assert_eq!(endpoint.host, "example.com");
        assert_eq!(endpoint.port, 80);
        assert_eq!(endpoint.path, "/stream?topic=a");
    }

    #[test]
    fn test_endpoint_explicit_port_and_root_path() {
        let endpoint = endpoint_of(&parse("http://127.0.0.1:8080")).unwrap();
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.path, "/");
    }

    #[test]
    fn test_endpoint_rejects_other_schemes() {
        assert!(matches!(
            endpoint_of(&parse("https://example.com/")),
            Err(EventSourceError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_accepts_event_stream() {
        let ok = head(StatusCode::OK, Version::HTTP_11, Some("text/event-stream"));
        assert!(EventSource::validate(&ok).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_heads() {
        let cases = [
            head(StatusCode::NOT_FOUND, Version::HTTP_11, Some("text/event-stream")),
            head(StatusCode::OK, Version::HTTP_10, Some("text/event-stream")),
            head(StatusCode::OK, Version::HTTP_11, Some("text/plain")),
            head(
                StatusCode::OK,
                Version::HTTP_11,
                Some("text/event-stream; charset=utf-8"),
            ),
            head(StatusCode::OK, Version::HTTP_11, None),
        ];
        for case in &cases {
            assert!(
                matches!(
                    EventSource::validate(case),
                    Err(EventSourceError::ProtocolError(_))
                ),
                "accepted {case:?}"
            );
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SupervisorState::ReconnectScheduled.to_string(), "reconnect-scheduled");
        assert_eq!(SupervisorState::Closed.to_string(), "closed");
    }
}
