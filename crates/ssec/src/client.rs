//! Async event streams
//!
//! Network reads and backoff waits are suspension points; dropping the
//! [`EventStream`] cancels whichever one is in progress and closes the
//! connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use tracing::{debug, instrument};
use url::Url;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event::Event;
use crate::streaming::Pipeline;
use crate::supervisor::{Admission, Supervisor};
use crate::transport::Transport;

/// A lazy, forward-only sequence of server-sent events
///
/// Implements `Stream<Item = Result<Event, StreamError>>`. The stream ends
/// without error when the server answers 204; a validation failure or a
/// transport failure that outlives the retry budget is the last item.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use ssec::StreamConfig;
///
/// # async fn example() -> ssec::Result<()> {
/// let mut events = ssec::stream("http://localhost:8080/events", StreamConfig::default())?;
///
/// while let Some(event) = events.next().await {
///     let event = event?;
///     println!("{}: {}", event.event_type, event.data_str());
/// }
/// # Ok(())
/// # }
/// ```
pub struct EventStream {
    inner: BoxStream<'static, Result<Event>>,
}

impl EventStream {
    /// Get the next event from the stream
    ///
    /// Returns `None` when the stream has ended.
    pub async fn next(&mut self) -> Option<Result<Event>> {
        self.inner.next().await
    }
}

impl Stream for EventStream {
    type Item = Result<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

/// Stream events from `url` with a default HTTP client.
///
/// The client only bounds connecting (`connect_timeout_ms`); reads never time
/// out since event streams may stay idle indefinitely.
pub fn stream(url: &str, config: StreamConfig) -> Result<EventStream> {
    config.validate()?;
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .build()
        .map_err(StreamError::Client)?;
    stream_with_client(client, url, config)
}

/// Stream events using a caller-supplied reqwest client
pub fn stream_with_client(
    client: reqwest::Client,
    url: &str,
    config: StreamConfig,
) -> Result<EventStream> {
    stream_with_transport(client, url, config)
}

/// Stream events over any [`Transport`]
#[instrument(skip(transport, config))]
pub fn stream_with_transport<T>(transport: T, url: &str, config: StreamConfig) -> Result<EventStream>
where
    T: Transport + 'static,
{
    config.validate()?;
    let url = Url::parse(url)?;
    debug!(?config, "Starting event stream");

    Ok(EventStream {
        inner: drive(transport, Supervisor::new(url, &config)).boxed(),
    })
}

fn drive<T>(transport: T, mut supervisor: Supervisor) -> impl Stream<Item = Result<Event>> + Send
where
    T: Transport + 'static,
{
    async_stream::stream! {
        let mut pipeline = Pipeline::new();

        'connect: while supervisor.has_attempts_left() {
            let request = supervisor.connect_request();
            let opened = match transport.open(&request).await {
                Ok(opened) => opened,
                Err(e) => {
                    if let Some(wait) = supervisor.on_transport_error(e) {
                        tokio::time::sleep(wait).await;
                    }
                    continue;
                }
            };

            match supervisor.admit(opened.status, opened.content_type.as_deref()) {
                Ok(Admission::Stream) => {}
                Ok(Admission::Stop) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            pipeline.reset();
            let mut body = opened.body;
            loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        let outcome = pipeline.feed(&chunk);
                        supervisor.apply(&outcome);
                        for event in outcome.events {
                            yield Ok(event);
                        }
                    }
                    Some(Err(e)) => {
                        drop(body);
                        if let Some(wait) = supervisor.on_transport_error(e) {
                            tokio::time::sleep(wait).await;
                        }
                        continue 'connect;
                    }
                    None => {
                        drop(body);
                        let wait = supervisor.on_stream_end();
                        tokio::time::sleep(wait).await;
                        continue 'connect;
                    }
                }
            }
        }

        if let Some(error) = supervisor.take_error() {
            yield Err(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::LAST_EVENT_ID;
    use crate::testing::{Reply, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    const URL: &str = "http://localhost/events";

    fn config() -> StreamConfig {
        StreamConfig::builder()
            .max_connect_attempts(3)
            .reconnect_timeout_ms(100)
            .backoff_delay(2.0)
            .build()
    }

    async fn collect(events: EventStream) -> (Vec<Event>, Option<StreamError>) {
        let items: Vec<Result<Event>> = events.collect().await;
        let mut ok = Vec::new();
        let mut error = None;
        for item in items {
            match item {
                Ok(event) => ok.push(event),
                Err(e) => error = Some(e),
            }
        }
        (ok, error)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_content_ends_cleanly() {
        let transport = ScriptedTransport::new([Reply::no_content()]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let (events, error) = collect(events).await;
        assert!(events.is_empty());
        assert!(error.is_none());
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_not_retried() {
        let transport = ScriptedTransport::new([Reply::status(500), Reply::events(["data: x\n\n"])]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let (events, error) = collect(events).await;
        assert!(events.is_empty());
        assert!(matches!(error, Some(StreamError::Status(500))));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_content_type_is_fatal() {
        let transport = ScriptedTransport::new([Reply::events(["data: x\n\n"]).content_type("application/json")]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let (events, error) = collect(events).await;
        assert!(events.is_empty());
        assert!(matches!(error, Some(StreamError::ContentType(_))));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_raises_last_transport_error() {
        let transport = ScriptedTransport::new([
            Reply::fail("refused 1"),
            Reply::fail("refused 2"),
            Reply::fail("refused 3"),
            Reply::events(["data: never\n\n"]),
        ]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let start = Instant::now();
        let (events, error) = collect(events).await;
        let elapsed = start.elapsed();

        assert!(events.is_empty());
        assert_eq!(transport.attempts(), 3);
        let error = error.unwrap();
        assert!(error.is_retryable());
        assert_eq!(error.to_string(), "Connection failed: refused 3");

        // 100ms, then 100ms + 2^1 s; no wait after the last attempt
        assert!(elapsed >= Duration::from_millis(2_200), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2_300), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_last_event_id() {
        let transport = ScriptedTransport::new([
            Reply::events(["id: 1\ndata: a\n\n", "id: 2\ndata: b\n\ndata: partial"]).then_fail("reset"),
            Reply::events(["data: c\n\n"]),
            Reply::no_content(),
        ]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let (events, error) = collect(events).await;
        assert!(error.is_none());
        assert_eq!(
            events,
            vec![Event::message("a"), Event::message("b"), Event::message("c")]
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(!requests[0].headers.contains_key(LAST_EVENT_ID));
        assert_eq!(requests[1].headers[LAST_EVENT_ID], "2");
        assert_eq!(requests[2].headers[LAST_EVENT_ID], "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_reset_after_successful_reconnect() {
        // Two failures, a good connection that drops, then one more failure:
        // with a budget of three this only works if the counter was reset.
        let transport = ScriptedTransport::new([
            Reply::fail("down"),
            Reply::fail("down"),
            Reply::events(["data: up\n\n"]).then_fail("dropped"),
            Reply::fail("down"),
            Reply::no_content(),
        ]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let start = Instant::now();
        let (events, error) = collect(events).await;

        assert!(error.is_none());
        assert_eq!(events, vec![Event::message("up")]);
        assert_eq!(transport.attempts(), 5);
        // 100 + 2100 before the good connection, then 100 (counter back at
        // zero) + 2100 after it
        assert!(start.elapsed() >= Duration::from_millis(4_400));
        assert!(start.elapsed() < Duration::from_millis(4_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_field_sets_reconnect_wait() {
        let transport = ScriptedTransport::new([
            Reply::events(["retry: 5000\ndata: a\n\n"]),
            Reply::no_content(),
        ]);
        let events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let start = Instant::now();
        let (events, _) = collect(events).await;
        assert_eq!(events, vec![Event::message("a")]);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_before_connection_ends() {
        let transport = ScriptedTransport::new([Reply::events(["data: first\n\n"]).then_fail("gone")]);
        let mut events = stream_with_transport(transport.clone(), URL, config()).unwrap();

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first, Event::message("first"));
        assert_eq!(transport.attempts(), 1);

        // Dropping cancels the pending backoff without further attempts
        drop(events);
        assert_eq!(transport.attempts(), 1);
    }

    #[test]
    fn test_eager_errors() {
        let transport = ScriptedTransport::new([]);
        assert!(matches!(
            stream_with_transport(transport.clone(), "not a url", config()),
            Err(StreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            stream_with_transport(transport, URL, StreamConfig::builder().chunk_size(0).build()),
            Err(StreamError::Config(_))
        ));
    }
}
