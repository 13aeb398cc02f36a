//! `eventsource` - print the events of a Server-Sent Events stream.

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod cli;
mod output;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use eventsource_client::{EventSourceClient, SupervisorState};
use eventsource_http::{HttpTransport, TokioScheduler};
use tracing::info;

use crate::cli::Cli;
use crate::output::Printer;

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        // Display error with its cause chain
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.init_tracing();

    let transport = Arc::new(HttpTransport::new().context("failed to create HTTP transport")?);
    let scheduler = Arc::new(TokioScheduler::new().context("failed to create scheduler")?);
    let client = EventSourceClient::new(transport.clone(), scheduler);

    let source = client
        .event_source_with(&cli.url, Arc::new(Printer::new(cli.json)), cli.config())
        .with_context(|| format!("cannot subscribe to {}", cli.url))?;
    source.connect();

    // Without reconnection the stream is over once it drops back to idle.
    let reconnects = cli.retry_ms >= 0;
    let mut states = source.subscribe();
    let finished = states.wait_for(|state| {
        *state == SupervisorState::Closed || (!reconnects && *state == SupervisorState::Idle)
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Interrupted, closing {}", source.url());
        }
        _ = finished => info!("Stream {} ended", source.url()),
    }

    client.shutdown();
    transport.shutdown();
    info!("Final stream metrics: {:?}", source.metrics());
    Ok(())
}
