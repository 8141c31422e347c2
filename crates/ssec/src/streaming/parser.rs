//! SSE (Server-Sent Events) parser
//!
//! Runs the field-dispatch state machine over framed lines.

use std::time::Duration;

use tracing::{debug, trace};

use crate::event::{Event, DEFAULT_EVENT_TYPE};

/// Separates a field name from its value
const DELIMITER: char = ':';

/// What one batch of lines produced.
///
/// Reconnection updates are returned rather than written into shared state;
/// the supervisor applies them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Events completed by this batch, in stream order
    pub events: Vec<Event>,
    /// Last `id:` value seen in this batch, if any
    pub last_event_id: Option<String>,
    /// Last valid `retry:` value seen in this batch, if any
    pub reconnection_time: Option<Duration>,
}

/// SSE parser state
#[derive(Debug, Default)]
pub struct EventParser {
    /// Current event type (if any)
    event_type: String,
    /// Current event data being accumulated
    data_buffer: String,
}

impl EventParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a batch of lines.
    ///
    /// A partially accumulated event carries over to the next batch; it is only
    /// dispatched once the blank line that ends it arrives.
    pub fn parse<I, S>(&mut self, lines: I) -> ParseOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = ParseOutcome::default();
        for line in lines {
            self.process_line(line.as_ref(), &mut outcome);
        }
        outcome
    }

    /// Discard a partially accumulated event
    pub fn reset(&mut self) {
        self.event_type.clear();
        self.data_buffer.clear();
    }

    fn process_line(&mut self, line: &str, outcome: &mut ParseOutcome) {
        // Empty line signals end of event
        if line.is_empty() {
            outcome.events.push(self.dispatch_event());
            return;
        }

        // Comment line (keepalive)
        if line.starts_with(DELIMITER) {
            trace!("SSE keepalive/comment");
            return;
        }

        // Split on first colon; a line without one is a field with no value
        let (field, value) = match line.split_once(DELIMITER) {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event_type = value.to_string();
            }
            "data" => {
                self.data_buffer.push_str(value);
                self.data_buffer.push('\n');
            }
            "id" => {
                debug!(id = value, "SSE last event id updated");
                outcome.last_event_id = Some(value.to_string());
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    match value.parse::<u64>() {
                        Ok(ms) => {
                            debug!(retry_ms = ms, "SSE reconnection time updated");
                            outcome.reconnection_time = Some(Duration::from_millis(ms));
                        }
                        Err(_) => trace!("SSE retry out of range: {}", value),
                    }
                } else {
                    trace!("SSE ignoring non-numeric retry: {}", value);
                }
            }
            _ => {
                // Unknown field - ignored
                trace!("SSE unknown field: {}", field);
            }
        }
    }

    /// Dispatch the accumulated event and start a new one
    fn dispatch_event(&mut self) -> Event {
        let mut event_type = std::mem::take(&mut self.event_type);
        if event_type.is_empty() {
            event_type = DEFAULT_EVENT_TYPE.to_string();
        }

        let mut data = std::mem::take(&mut self.data_buffer);
        if data.ends_with('\n') {
            data.pop();
        }

        Event {
            event_type,
            data: Some(data),
        }
    }
}
