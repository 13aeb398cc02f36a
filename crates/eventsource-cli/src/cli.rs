//! CLI argument parsing

use clap::{ArgAction, Parser};
use eventsource_client::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_RECONNECT_INTERVAL_MS, EventSourceConfig};
use tracing_subscriber::EnvFilter;

/// Subscribe to a Server-Sent Events stream and print every event
#[derive(Parser, Debug)]
#[command(
    name = "eventsource",
    version,
    about = "Subscribe to a Server-Sent Events stream and print every event",
    long_about = "Connects to an HTTP event stream, prints each event as it arrives and\n\
                  reconnects after disconnects, resuming from the last event id.\n\
                  Press Ctrl-C to stop."
)]
pub(crate) struct Cli {
    /// Stream URL (http only)
    #[arg(env = "EVENTSOURCE_URL")]
    pub(crate) url: String,

    /// Reconnect delay in milliseconds; negative disables reconnection
    #[arg(
        long,
        env = "EVENTSOURCE_RETRY_MS",
        default_value_t = DEFAULT_RECONNECT_INTERVAL_MS,
        allow_negative_numbers = true
    )]
    pub(crate) retry_ms: i64,

    /// Largest number of bytes buffered while waiting for an event boundary
    #[arg(long, env = "EVENTSOURCE_MAX_FRAME", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub(crate) max_frame: usize,

    /// Extra request header, as `Name: value` (repeatable)
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub(crate) headers: Vec<(String, String)>,

    /// Print events as JSON lines
    #[arg(long)]
    pub(crate) json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub(crate) verbose: u8,
}

impl Cli {
    /// Stream configuration derived from the flags.
    pub(crate) fn config(&self) -> EventSourceConfig {
        self.headers.iter().fold(
            EventSourceConfig::default()
                .with_reconnect_interval(self.retry_ms)
                .with_max_frame_size(self.max_frame),
            |config, (name, value)| config.with_header(name.clone(), value.clone()),
        )
    }

    /// Log filter: `RUST_LOG` if set, otherwise derived from `-v`.
    pub(crate) fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_level()))
    }

    fn default_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Initialize tracing subscriber; logs go to stderr so stdout stays parseable.
    pub(crate) fn init_tracing(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::try_parse_from(["eventsource", "http://localhost:8080/events"]).unwrap();
        assert_eq!(cli.url, "http://localhost:8080/events");
        assert_eq!(cli.retry_ms, 2000);
        assert_eq!(cli.max_frame, 32 * 1024);
        assert!(!cli.json);
        assert_eq!(cli.config(), EventSourceConfig::default());
    }

    #[test]
    fn test_negative_retry_disables_reconnect() {
        let cli = Cli::try_parse_from(["eventsource", "--retry-ms", "-1", "http://h/"]).unwrap();
        assert_eq!(cli.config().reconnect_interval, -1);
    }

    #[test]
    fn test_headers_are_collected() {
        let cli = Cli::try_parse_from([
            "eventsource",
            "-H",
            "Authorization: Bearer abc",
            "--header",
            "X-Trace:1",
            "http://h/",
        ])
        .unwrap();
        assert_eq!(
            cli.config().extra_headers,
            vec![
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(Cli::try_parse_from(["eventsource", "-H", "novalue", "http://h/"]).is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["eventsource", "-vv", "http://h/"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.default_level(), "debug");
    }
}
