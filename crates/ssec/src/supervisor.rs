//! Connection supervision: attempts, validation, backoff
//!
//! [`Supervisor`] is the reconnect state machine shared by the async and the
//! blocking driver. It never performs I/O itself; drivers report what
//! happened and get back the next request or how long to wait.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL};
use tracing::{info, warn};
use url::Url;

use crate::config::{HttpMethod, StreamConfig};
use crate::error::{StreamError, TransportError};
use crate::streaming::ParseOutcome;
use crate::transport::ConnectRequest;

/// Content type of an event stream
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";
/// Cache-Control sent with every request
pub const SSE_CACHE_CONTROL: &str = "no-store";
/// Header replaying the last seen event id
pub const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

const STATUS_OK: u16 = 200;
const STATUS_NO_CONTENT: u16 = 204;

/// Reconnection state of one stream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionState {
    /// Replayed as `Last-Event-ID` when non-empty
    pub last_event_id: String,
    /// Base wait before reconnecting
    pub reconnection_time: Duration,
}

impl ReconnectionState {
    pub fn new(reconnection_time: Duration) -> Self {
        Self {
            last_event_id: String::new(),
            reconnection_time,
        }
    }

    /// Take over the `id:`/`retry:` updates of a parsed batch
    pub fn apply(&mut self, outcome: &ParseOutcome) {
        if let Some(id) = &outcome.last_event_id {
            self.last_event_id.clone_from(id);
        }
        if let Some(time) = outcome.reconnection_time {
            self.reconnection_time = time;
        }
    }
}

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Opening a request
    Connecting,
    /// Reading the body of a validated response
    Streaming,
    /// Waiting before the next attempt
    Backoff,
    /// Server asked us to stop (204); terminal
    Stopped,
    /// Fatal error or attempt budget spent; terminal
    Failed,
}

impl ConnectionPhase {
    /// Returns `true` if no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Verdict on an opened response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Valid event stream: read the body
    Stream,
    /// 204 No Content: end the stream without error
    Stop,
}

/// Reconnect state machine for one stream call
#[derive(Debug)]
pub struct Supervisor {
    url: Url,
    method: HttpMethod,
    chunk_size: usize,
    max_connect_attempts: u32,
    backoff_delay: f64,
    attempt: u32,
    error: Option<TransportError>,
    state: ReconnectionState,
    phase: ConnectionPhase,
}

impl Supervisor {
    pub fn new(url: Url, config: &StreamConfig) -> Self {
        Self {
            url,
            method: config.method,
            chunk_size: config.chunk_size,
            max_connect_attempts: config.max_connect_attempts,
            backoff_delay: config.backoff_delay,
            attempt: 0,
            error: None,
            state: ReconnectionState::new(config.reconnect_timeout()),
            phase: ConnectionPhase::Connecting,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Consecutive failed attempts since the last validated connection
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> &ReconnectionState {
        &self.state
    }

    /// Whether another connection attempt may be made
    pub fn has_attempts_left(&self) -> bool {
        !self.phase.is_terminal() && self.attempt < self.max_connect_attempts
    }

    /// Build the next connection attempt
    pub fn connect_request(&mut self) -> ConnectRequest {
        self.phase = ConnectionPhase::Connecting;
        ConnectRequest {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers(),
            chunk_size: self.chunk_size,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SSE_CONTENT_TYPE));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(SSE_CACHE_CONTROL));

        if !self.state.last_event_id.is_empty() {
            match HeaderValue::from_str(&self.state.last_event_id) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => warn!(
                    last_event_id = %self.state.last_event_id,
                    "Last event id is not a valid header value, not replaying it"
                ),
            }
        }

        headers
    }

    /// Validate an opened response.
    ///
    /// Errors returned here are fatal: the supervisor moves to `Failed` and
    /// makes no further attempts.
    pub fn admit(
        &mut self,
        status: u16,
        content_type: Option<&str>,
    ) -> Result<Admission, StreamError> {
        if status == STATUS_NO_CONTENT {
            info!("Client was told to stop reconnecting.");
            self.phase = ConnectionPhase::Stopped;
            return Ok(Admission::Stop);
        }

        if status != STATUS_OK {
            warn!(status, url = %self.url, "Unexpected status code, giving up");
            self.phase = ConnectionPhase::Failed;
            return Err(StreamError::Status(status));
        }

        if !content_type.is_some_and(|ct| ct.contains(SSE_CONTENT_TYPE)) {
            warn!(?content_type, url = %self.url, "Invalid content type, giving up");
            self.phase = ConnectionPhase::Failed;
            return Err(StreamError::ContentType(content_type.map(str::to_owned)));
        }

        self.error = None;
        self.attempt = 0;
        self.phase = ConnectionPhase::Streaming;
        info!("Connected to {}.", self.url);
        Ok(Admission::Stream)
    }

    /// Take over reconnection updates from a parsed batch
    pub fn apply(&mut self, outcome: &ParseOutcome) {
        self.state.apply(outcome);
    }

    /// Wait before the next attempt, given the current attempt counter
    pub fn waiting_period(&self) -> Duration {
        let base = self.state.reconnection_time;
        if self.attempt == 0 {
            return base;
        }
        let extra = self.backoff_delay.powf(f64::from(self.attempt));
        let extra = Duration::try_from_secs_f64(extra).unwrap_or(Duration::MAX);
        base.saturating_add(extra)
    }

    /// Record a transport failure.
    ///
    /// Returns how long to wait before the next attempt, or `None` once the
    /// attempt budget is spent (the error is then kept for [`take_error`]).
    ///
    /// [`take_error`]: Supervisor::take_error
    pub fn on_transport_error(&mut self, error: TransportError) -> Option<Duration> {
        let wait = self.waiting_period();
        self.error = Some(error);
        self.attempt += 1;

        if self.attempt >= self.max_connect_attempts {
            warn!(
                url = %self.url,
                attempts = self.attempt,
                "Failed to connect to {}, no attempts left.",
                self.url
            );
            self.phase = ConnectionPhase::Failed;
            return None;
        }

        info!(
            "Failed to connect to {}. Reconnect in {:.3} seconds [attempt {}/{}].",
            self.url,
            wait.as_secs_f64(),
            self.attempt,
            self.max_connect_attempts
        );
        self.phase = ConnectionPhase::Backoff;
        Some(wait)
    }

    /// Record a body that ended without error; returns the wait before reconnecting
    pub fn on_stream_end(&mut self) -> Duration {
        info!(
            "Stream from {} ended. Reconnect in {:.3} seconds.",
            self.url,
            self.state.reconnection_time.as_secs_f64()
        );
        self.phase = ConnectionPhase::Backoff;
        self.state.reconnection_time
    }

    /// The stored transport error, if the stream is ending because of it
    pub fn take_error(&mut self) -> Option<StreamError> {
        self.error.take().map(StreamError::from)
    }
}
