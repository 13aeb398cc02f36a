//! # Eventsource Client
//!
//! Server-Sent Events client core. It turns a transport's raw connection events
//! into typed messages, and keeps one logical stream alive across reconnects.
//!
//! ## Architecture
//!
//! ```text
//! Transport ──► EventSourceClient (InboundDispatcher + ConnectionRegistry)
//!                   │
//!                   ▼
//!               EventSource (supervisor)
//!                   │ head / fragments
//!                   ▼
//!               ChunkReassembler ──► EventStreamParser ──► EventSourceHandler
//!                                         │ retry / id
//!                                         ▼
//!                                  reconnect interval, Last-Event-ID
//! ```
//!
//! - [`ChunkReassembler`] joins body fragments into frames that end on an event
//!   boundary, under a configurable size bound.
//! - [`EventStreamParser`] implements the `text/event-stream` line protocol:
//!   `data`, `event`, `id` and `retry` fields, comments, and blank-line dispatch.
//! - [`EventSource`] writes the request, validates the response, and schedules
//!   at most one reconnect at a time, resuming from the last event id.
//!
//! The transport and the timer service are traits from
//! `eventsource-transport-traits`; `eventsource-http` provides tokio-based
//! implementations.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventsource_client::{EventSourceClient, EventSourceError, EventSourceHandler, MessageEvent};
//!
//! struct Printer;
//!
//! impl EventSourceHandler for Printer {
//!     fn on_message(&self, event_type: &str, event: MessageEvent) {
//!         println!("{event_type}: {}", event.data());
//!     }
//!     fn on_error(&self, error: EventSourceError) {
//!         eprintln!("{error}");
//!     }
//! }
//!
//! let client = EventSourceClient::new(transport, scheduler);
//! let source = client.event_source("http://localhost:8080/events", Arc::new(Printer))?;
//! source.connect();
//! source.join().await;
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod client;
mod config;
mod error;
mod handler;
mod message;
mod parser;
mod pipeline;
mod reassembler;
mod registry;
mod supervisor;

pub use client::EventSourceClient;
pub use config::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_RECONNECT_INTERVAL_MS, EventSourceConfig};
pub use error::{EventSourceError, EventSourceResult};
pub use handler::{CollectingHandler, EventSourceHandler};
pub use message::MessageEvent;
pub use parser::{DEFAULT_EVENT_TYPE, EventStreamParser};
pub use pipeline::{ConnectionControl, FragmentReceiver, HeadReceiver, LifecycleObserver};
pub use reassembler::ChunkReassembler;
pub use registry::ConnectionRegistry;
pub use supervisor::{EventSource, SupervisorState};

// Transport-level types callers need to implement or drive a transport.
pub use eventsource_transport_traits::{
    ConnectionId, Endpoint, InboundDispatcher, ResponseHead, Scheduler, StreamMetrics, Task,
    Transport, TransportError, TransportEvent,
};
