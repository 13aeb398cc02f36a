//! # Eventsource HTTP Transport
//!
//! Tokio-based implementations of the eventsource transport seams.
//!
//! ## Features
//!
//! - **[`HttpTransport`]**: one task per connection, HTTP/1.1 over plain TCP via
//!   hyper. Response heads and body frames are reported as they arrive.
//! - **[`TokioScheduler`]**: one-shot delayed tasks on a tokio runtime, all
//!   cancelled together on shutdown.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventsource_client::EventSourceClient;
//! use eventsource_http::{HttpTransport, TokioScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EventSourceClient::new(
//!         Arc::new(HttpTransport::new()?),
//!         Arc::new(TokioScheduler::new()?),
//!     );
//!     // ...
//!     Ok(())
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

mod scheduler;
mod transport;

pub use scheduler::TokioScheduler;
pub use transport::{HttpTransport, HttpTransportConfig};

// Re-export transport traits for convenience
pub use eventsource_transport_traits::{
    LimitsConfig, Scheduler, TimeoutConfig, Transport, TransportError, TransportResult,
};
