//! HTTP/1.1 transport for event streams

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use eventsource_transport_traits::{
    ConnectionId, Endpoint, InboundDispatcher, LimitsConfig, ResponseHead, TimeoutConfig,
    Transport, TransportError, TransportEvent, TransportResult,
};
use http::Request;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Connect and response timeouts.
    pub timeouts: TimeoutConfig,
    /// Response head limits.
    pub limits: LimitsConfig,
}

/// Owner instructions for a connection task.
#[derive(Debug)]
enum Command {
    Write(Request<()>),
    Close,
}

type Connections = Arc<Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<Command>>>>;

/// Transport opening one TCP connection per [`ConnectionId`] and speaking
/// HTTP/1.1 on it.
///
/// Each connection runs on its own task. Body frames are forwarded as
/// `Fragment` events as soon as hyper yields them, and the end of the body is
/// reported as an empty final fragment.
pub struct HttpTransport {
    runtime: Handle,
    config: HttpTransportConfig,
    /// Active connections map: id -> command sender
    connections: Connections,
    /// Set once shutdown was requested; later opens are refused
    stopped: AtomicBool,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

// Manual Debug implementation since broadcast::Sender doesn't implement Debug
impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("connections", &self.connections.lock().len())
            .field("stopped", &self.is_shutdown())
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport with default settings on the current tokio runtime.
    pub fn new() -> TransportResult<Self> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// Creates a transport with `config` on the current tokio runtime.
    pub fn with_config(config: HttpTransportConfig) -> TransportResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            TransportError::ConfigurationError(format!("no tokio runtime available: {e}"))
        })?;
        Ok(Self::with_handle(runtime, config))
    }

    /// Creates a transport spawning its connection tasks onto `runtime`.
    pub fn with_handle(runtime: Handle, config: HttpTransportConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runtime,
            config,
            connections: Arc::new(Mutex::new(HashMap::new())),
            stopped: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Transport settings.
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Number of connections whose task is still running.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Closes every connection. Each still ends with `Closed` and `Unbound`.
    ///
    /// Connections opened afterwards are closed right away.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        info!("HTTP transport shutting down");
    }

    fn send(&self, connection: ConnectionId, command: Command) -> TransportResult<()> {
        let sender = self
            .connections
            .lock()
            .get(&connection)
            .cloned()
            .ok_or_else(|| TransportError::SendFailed(format!("{connection} is not open")))?;
        sender
            .send(command)
            .map_err(|_| TransportError::SendFailed(format!("{connection} is closing")))
    }
}

impl Transport for HttpTransport {
    fn open(
        &self,
        connection: ConnectionId,
        endpoint: &Endpoint,
        inbound: Arc<dyn InboundDispatcher>,
    ) {
        // Subscribe before checking the flag so a concurrent shutdown is never missed.
        let shutdown_rx = self.shutdown_tx.subscribe();
        if self.is_shutdown() {
            debug!("Refusing to open {} after shutdown", connection);
            self.runtime.spawn(async move {
                inbound.dispatch(connection, TransportEvent::Closed);
                inbound.dispatch(connection, TransportEvent::Unbound);
            });
            return;
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.connections.lock().insert(connection, commands_tx);

        let task = ConnectionTask {
            id: connection,
            endpoint: endpoint.clone(),
            config: self.config.clone(),
            inbound,
            connections: Arc::clone(&self.connections),
        };
        self.runtime.spawn(task.run(commands_rx, shutdown_rx));
    }

    fn write(&self, connection: ConnectionId, request: Request<()>) -> TransportResult<()> {
        self.send(connection, Command::Write(request))
    }

    fn close(&self, connection: ConnectionId) {
        if self.send(connection, Command::Close).is_err() {
            trace!("Close of {} ignored, not open", connection);
        }
    }
}

/// Aborts the hyper connection driver when the exchange ends.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct ConnectionTask {
    id: ConnectionId,
    endpoint: Endpoint,
    config: HttpTransportConfig,
    inbound: Arc<dyn InboundDispatcher>,
    connections: Connections,
}

impl ConnectionTask {
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let outcome = tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("{} received shutdown signal", self.id);
                Ok(())
            }
            result = self.drive(&mut commands) => result,
        };

        if let Err(e) = outcome {
            debug!("{} failed: {}", self.id, e);
            self.emit(TransportEvent::Exception(e));
        }

        self.connections.lock().remove(&self.id);
        self.emit(TransportEvent::Closed);
        self.emit(TransportEvent::Unbound);
    }

    fn emit(&self, event: TransportEvent) {
        self.inbound.dispatch(self.id, event);
    }

    async fn drive(&self, commands: &mut mpsc::UnboundedReceiver<Command>) -> TransportResult<()> {
        let stream = tokio::select! {
            result = self.connect() => result?,
            () = wait_for_close(commands) => return Ok(()),
        };

        let mut builder = http1::Builder::new();
        if let Some(max) = self.config.limits.max_head_size {
            // hyper refuses read buffers below 8 KiB.
            builder.max_buf_size(max.max(8 * 1024));
        }
        builder.max_headers(self.config.limits.max_headers);
        let (mut sender, conn) = builder
            .handshake::<_, Empty<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("HTTP handshake with {} failed: {e}", self.endpoint))
            })?;

        let id = self.id;
        let _driver = AbortOnDrop(tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("HTTP connection {} ended: {}", id, e);
            }
        }));

        self.emit(TransportEvent::Connected);

        let request = match commands.recv().await {
            Some(Command::Write(request)) => request,
            Some(Command::Close) | None => return Ok(()),
        };
        let (parts, ()) = request.into_parts();
        let request = Request::from_parts(parts, Empty::<Bytes>::new());

        tokio::select! {
            result = self.exchange(&mut sender, request) => result,
            () = wait_for_close(commands) => {
                debug!("{} closed by owner", self.id);
                Ok(())
            }
        }
    }

    async fn connect(&self) -> TransportResult<TcpStream> {
        let authority = self.endpoint.authority();
        debug!("Connecting {} to {}", self.id, authority);

        let timeout = self.config.timeouts.connect;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&authority))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                operation: format!("connect to {authority}"),
                timeout,
            })?
            .map_err(|e| {
                TransportError::from(std::io::Error::new(e.kind(), format!("{authority}: {e}")))
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", self.id, e);
        }
        Ok(stream)
    }

    async fn exchange(
        &self,
        sender: &mut http1::SendRequest<Empty<Bytes>>,
        request: Request<Empty<Bytes>>,
    ) -> TransportResult<()> {
        trace!("{} sending {} {}", self.id, request.method(), request.uri());
        let pending = sender.send_request(request);
        let response = match self.config.timeouts.response_head {
            Some(timeout) => tokio::time::timeout(timeout, pending).await.map_err(|_| {
                TransportError::ConnectionTimeout {
                    operation: "response head".to_string(),
                    timeout,
                }
            })?,
            None => pending.await,
        }
        .map_err(|e| TransportError::ReceiveFailed(format!("failed to read response: {e}")))?;

        let (parts, mut body) = response.into_parts();
        let mut head = ResponseHead::new(parts.status, parts.version);
        head.headers = parts.headers;
        debug!("{} received {} {:?}", self.id, head.status, head.version);
        self.emit(TransportEvent::Head(head));

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| {
                error!("Error reading body on {}: {}", self.id, e);
                TransportError::ConnectionLost(format!("error reading response body: {e}"))
            })?;
            if let Ok(bytes) = frame.into_data() {
                if bytes.is_empty() {
                    continue;
                }
                self.emit(TransportEvent::Fragment {
                    bytes,
                    is_final: false,
                });
            }
        }

        self.emit(TransportEvent::Fragment {
            bytes: Bytes::new(),
            is_final: true,
        });
        Ok(())
    }
}

/// Resolves once the owner closes the connection or drops its sender.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) | None => return,
            Some(Command::Write(request)) => {
                warn!("Ignoring request {} written out of turn", request.uri());
            }
        }
    }
}
