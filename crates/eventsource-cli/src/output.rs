//! Printing handler

use std::io::Write;

use eventsource_client::{EventSourceError, EventSourceHandler, MessageEvent};
use tracing::{info, warn};

/// Prints events to stdout, one per line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Printer {
    json: bool,
}

impl Printer {
    pub(crate) fn new(json: bool) -> Self {
        Self { json }
    }

    /// Renders one event the way it is printed.
    pub(crate) fn render(&self, event_type: &str, event: &MessageEvent) -> String {
        if self.json {
            serde_json::json!({
                "event": event_type,
                "data": event.data(),
                "lastEventId": event.last_event_id(),
                "origin": event.origin(),
            })
            .to_string()
        } else {
            format!("event = {event_type}, message = {event}")
        }
    }
}

impl EventSourceHandler for Printer {
    fn on_connect(&self) {
        info!("Stream connected");
    }

    fn on_message(&self, event_type: &str, event: MessageEvent) {
        let line = self.render(event_type, &event);
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            warn!("Failed to write event: {}", e);
        }
    }

    fn on_error(&self, error: EventSourceError) {
        eprintln!("error = {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event() -> MessageEvent {
        MessageEvent::new("hello", Some("7".to_string()), "http://h/events")
    }

    #[test]
    fn test_render_text() {
        let line = Printer::new(false).render("message", &event());
        assert_eq!(line, format!("event = message, message = {}", event()));
    }

    #[test]
    fn test_render_json() {
        let line = Printer::new(true).render("tick", &event());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "tick",
                "data": "hello",
                "lastEventId": "7",
                "origin": "http://h/events",
            })
        );
    }

    #[test]
    fn test_render_json_without_id() {
        let event = MessageEvent::from_data("x");
        let line = Printer::new(true).render("message", &event);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value["lastEventId"].is_null());
    }
}
