//! # Eventsource Transport Traits
//!
//! Transport and scheduler abstractions for the eventsource client.
//! This crate provides the seams the client core is written against; concrete
//! socket/HTTP implementations live in `eventsource-http`.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Transport`], [`InboundDispatcher`], [`Scheduler`]
//! - **Events**: [`TransportEvent`], [`ResponseHead`], [`ConnectionId`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`LimitsConfig`], [`TimeoutConfig`]
//! - **Metrics**: [`StreamMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement [`Transport`]:
//!
//! ```rust,ignore
//! use eventsource_transport_traits::{ConnectionId, Endpoint, InboundDispatcher, Transport};
//!
//! #[derive(Debug)]
//! struct MyTransport { /* ... */ }
//!
//! impl Transport for MyTransport {
//!     fn open(&self, id: ConnectionId, endpoint: &Endpoint, inbound: Arc<dyn InboundDispatcher>) {
//!         /* connect in the background and deliver TransportEvents to `inbound` */
//!     }
//!     // ... write / close
//! }
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

mod config;
mod error;
mod events;
mod metrics;
mod traits;

// Re-export all public items
pub use config::{LimitsConfig, TimeoutConfig};
pub use error::{TransportError, TransportResult};
pub use events::{ConnectionId, Endpoint, ResponseHead, TransportEvent};
pub use metrics::{AtomicMetrics, StreamMetrics};
pub use traits::{InboundDispatcher, Scheduler, Task, Transport};
