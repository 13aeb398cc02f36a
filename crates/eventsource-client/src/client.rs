//! The client: shared transport, scheduler and connection registry.

use std::fmt;
use std::sync::{Arc, Weak};

use eventsource_transport_traits::{ConnectionId, InboundDispatcher, Scheduler, Transport, TransportEvent};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::EventSourceConfig;
use crate::error::{EventSourceError, EventSourceResult};
use crate::handler::EventSourceHandler;
use crate::registry::ConnectionRegistry;
use crate::supervisor::EventSource;

/// State every event source of a client shares.
///
/// Routes transport events to the source owning the connection and forgets
/// connections once the transport unbinds them.
pub(crate) struct ClientShared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) registry: ConnectionRegistry<EventSource>,
}

impl fmt::Debug for ClientShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientShared")
            .field("transport", &self.transport)
            .field("scheduler", &self.scheduler)
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl InboundDispatcher for ClientShared {
    fn dispatch(&self, connection: ConnectionId, event: TransportEvent) {
        if let TransportEvent::Unbound = event {
            if self.registry.remove(connection).is_some() {
                trace!("Unbound {}", connection);
            }
            return;
        }

        match self.registry.lookup(connection) {
            Some(source) => source.handle_event(connection, event),
            None => warn!(
                "No event source registered for {}, dropping {} event",
                connection,
                event.kind()
            ),
        }
    }
}

/// Factory and owner of [`EventSource`]s sharing one transport and one scheduler.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use eventsource_client::{CollectingHandler, EventSourceClient};
/// # fn demo(client: EventSourceClient) -> Result<(), Box<dyn std::error::Error>> {
/// let handler = Arc::new(CollectingHandler::new());
/// let source = client.event_source("http://localhost:8080/events", handler)?;
/// source.connect();
/// // ...
/// client.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct EventSourceClient {
    shared: Arc<ClientShared>,
    sources: Mutex<Vec<Weak<EventSource>>>,
}

impl fmt::Debug for EventSourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceClient")
            .field("shared", &self.shared)
            .field("sources", &self.sources.lock().len())
            .finish()
    }
}

impl EventSourceClient {
    /// Creates a client over `transport`, running reconnect timers on `scheduler`.
    pub fn new(transport: Arc<dyn Transport>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                transport,
                scheduler,
                registry: ConnectionRegistry::new(),
            }),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Creates an event source for `url` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Configuration`] if `url` is not a valid
    /// `http` URL.
    pub fn event_source(
        &self,
        url: &str,
        handler: Arc<dyn EventSourceHandler>,
    ) -> EventSourceResult<Arc<EventSource>> {
        self.event_source_with(url, handler, EventSourceConfig::default())
    }

    /// Creates an event source for `url` with `config`. It does not connect yet.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Configuration`] if `url` is not a valid
    /// `http` URL or `config` fails validation.
    pub fn event_source_with(
        &self,
        url: &str,
        handler: Arc<dyn EventSourceHandler>,
        config: EventSourceConfig,
    ) -> EventSourceResult<Arc<EventSource>> {
        let url = url::Url::parse(url)
            .map_err(|e| EventSourceError::Configuration(format!("invalid URL {url:?}: {e}")))?;
        let source = EventSource::new(&url, handler, config, Arc::clone(&self.shared))?;

        let mut sources = self.sources.lock();
        sources.retain(|weak| weak.strong_count() > 0);
        sources.push(Arc::downgrade(&source));
        debug!("Created event source for {}", url);
        Ok(source)
    }

    /// Number of connections the transport has not yet unbound.
    pub fn active_connections(&self) -> usize {
        self.shared.registry.len()
    }

    /// Closes every event source and stops the scheduler.
    pub fn shutdown(&self) {
        let sources: Vec<_> = self.sources.lock().drain(..).collect();
        for source in sources.iter().filter_map(Weak::upgrade) {
            source.close();
        }
        self.shared.scheduler.shutdown();
        // Breaks the source -> client -> registry -> source cycle for
        // connections the transport never unbinds.
        let leftover = self.shared.registry.drain();
        info!(
            "Event source client shut down ({} connections released)",
            leftover.len()
        );
    }
}
