//! Blocking event streams
//!
//! The same reconnect behavior as [`crate::stream`], for callers without an
//! async runtime. Reads block the calling thread, as do backoff waits.
//!
//! # Example
//!
//! ```no_run
//! use ssec::StreamConfig;
//!
//! # fn example() -> ssec::Result<()> {
//! for event in ssec::blocking::stream("http://localhost:8080/events", StreamConfig::default())? {
//!     let event = event?;
//!     println!("{}: {}", event.event_type, event.data_str());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument};
use url::Url;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError, TransportError};
use crate::event::Event;
use crate::streaming::Pipeline;
use crate::supervisor::{Admission, Supervisor};
use crate::transport::{BlockingBody, BlockingTransport};

/// Stream events from `url` with a default blocking HTTP client.
///
/// Must not be called from within an async runtime, since the blocking
/// reqwest client starts one of its own.
pub fn stream(url: &str, config: StreamConfig) -> Result<EventIter> {
    config.validate()?;
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(None::<Duration>)
        .build()
        .map_err(StreamError::Client)?;
    stream_with_client(client, url, config)
}

/// Stream events using a caller-supplied blocking reqwest client
pub fn stream_with_client(
    client: reqwest::blocking::Client,
    url: &str,
    config: StreamConfig,
) -> Result<EventIter> {
    stream_with_transport(client, url, config)
}

/// Stream events over any [`BlockingTransport`]
#[instrument(skip(transport, config))]
pub fn stream_with_transport<T>(transport: T, url: &str, config: StreamConfig) -> Result<EventIter<T>>
where
    T: BlockingTransport,
{
    config.validate()?;
    let url = Url::parse(url)?;
    debug!(?config, "Starting blocking event stream");

    Ok(EventIter {
        transport,
        supervisor: Supervisor::new(url, &config),
        pipeline: Pipeline::new(),
        body: None,
        pending: VecDeque::new(),
        buffer: vec![0; config.chunk_size],
        done: false,
    })
}

/// Iterator over server-sent events
///
/// Yields `Result<Event, StreamError>`. Once it returns an error or `None`
/// it is exhausted; dropping it closes the connection.
pub struct EventIter<T = reqwest::blocking::Client> {
    transport: T,
    supervisor: Supervisor,
    pipeline: Pipeline,
    body: Option<BlockingBody>,
    /// Events parsed from the last chunk, not yet handed out
    pending: VecDeque<Event>,
    buffer: Vec<u8>,
    done: bool,
}

impl<T: BlockingTransport> EventIter<T> {
    /// The reconnect state machine driving this stream
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Open the next connection; fatal validation errors are returned
    fn connect(&mut self) -> Result<()> {
        let request = self.supervisor.connect_request();
        let opened = match self.transport.open(&request) {
            Ok(opened) => opened,
            Err(e) => {
                self.backoff(e);
                return Ok(());
            }
        };

        match self
            .supervisor
            .admit(opened.status, opened.content_type.as_deref())?
        {
            Admission::Stream => {
                self.pipeline.reset();
                self.body = Some(opened.body);
            }
            Admission::Stop => self.done = true,
        }
        Ok(())
    }

    fn backoff(&mut self, error: TransportError) {
        if let Some(wait) = self.supervisor.on_transport_error(error) {
            thread::sleep(wait);
        }
    }
}

impl<T: BlockingTransport> Iterator for EventIter<T> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            let Some(body) = self.body.as_mut() else {
                if !self.supervisor.has_attempts_left() {
                    self.done = true;
                    return self.supervisor.take_error().map(Err);
                }
                if let Err(e) = self.connect() {
                    self.done = true;
                    return Some(Err(e));
                }
                continue;
            };

            match body.read(&mut self.buffer) {
                Ok(0) => {
                    self.body = None;
                    thread::sleep(self.supervisor.on_stream_end());
                }
                Ok(n) => {
                    let outcome = self.pipeline.feed(&self.buffer[..n]);
                    self.supervisor.apply(&outcome);
                    self.pending.extend(outcome.events);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.body = None;
                    self.backoff(TransportError::Io(e));
                }
            }
        }
    }
}

impl<T: BlockingTransport> FusedIterator for EventIter<T> {}

impl<T> std::fmt::Debug for EventIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIter")
            .field("supervisor", &self.supervisor)
            .field("connected", &self.body.is_some())
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{ConnectionPhase, LAST_EVENT_ID};
    use crate::testing::{Reply, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    const URL: &str = "http://localhost/events";

    fn config() -> StreamConfig {
        StreamConfig::builder()
            .max_connect_attempts(3)
            .reconnect_timeout_ms(5)
            .backoff_delay(0.01)
            .build()
    }

    #[test]
    fn test_events_across_small_reads() {
        let transport = ScriptedTransport::new([
            Reply::events(["event: greeting\r\ndata: héllo\r\n\r\ndata: a\ndata: b\n\n"]),
            Reply::no_content(),
        ]);
        let config = StreamConfig {
            chunk_size: 3,
            ..config()
        };

        let events: Vec<Event> = stream_with_transport(transport, URL, config)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            events,
            vec![Event::new("greeting", "héllo"), Event::message("a\nb")]
        );
    }

    #[test]
    fn test_no_content_stops() {
        let transport = ScriptedTransport::new([Reply::no_content()]);
        let mut events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        assert!(events.next().is_none());
        assert_eq!(events.supervisor().phase(), ConnectionPhase::Stopped);
        assert_eq!(transport.attempts(), 1);
    }

    #[test]
    fn test_bad_status_is_fatal() {
        let transport = ScriptedTransport::new([Reply::status(404), Reply::events(["data: x\n\n"])]);
        let mut events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        assert!(matches!(events.next(), Some(Err(StreamError::Status(404)))));
        assert!(events.next().is_none());
        assert_eq!(transport.attempts(), 1);
    }

    #[test]
    fn test_exhausted_budget_yields_last_error() {
        let transport = ScriptedTransport::new([
            Reply::fail("first"),
            Reply::fail("second"),
            Reply::fail("third"),
        ]);
        let mut events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let error = events.next().unwrap().unwrap_err();
        assert_eq!(error.to_string(), "Connection failed: third");
        assert!(events.next().is_none());
        assert!(events.next().is_none());
        assert_eq!(transport.attempts(), 3);
    }

    #[test]
    fn test_read_error_reconnects_with_last_event_id() {
        let transport = ScriptedTransport::new([
            Reply::events(["id: 42\ndata: before\n\n"]).then_fail("reset"),
            Reply::events(["data: after\n\n"]),
        ]);

        let events: Vec<Event> = stream_with_transport(transport.clone(), URL, config())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(events, vec![Event::message("before"), Event::message("after")]);
        let requests = transport.requests();
        // third request is answered 204 once the script runs out
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].headers[LAST_EVENT_ID], "42");
    }

    #[test]
    fn test_retry_field_applies_to_reconnect() {
        let transport = ScriptedTransport::new([Reply::events(["retry: 60\n\n"])]);

        let start = Instant::now();
        let events: Vec<Event> = stream_with_transport(transport, URL, config())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        // the blank line dispatches an empty message
        assert_eq!(events, vec![Event::message("")]);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
