//! Error types for SSE streaming

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for SSE client operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors surfaced by an event stream
///
/// Only [`StreamError::Transport`] is retried by the reconnect loop. Status and
/// content-type failures end the stream on the first response that shows them.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Server answered with something other than 200 or 204
    #[error("Unexpected status code: {0}")]
    Status(u16),

    /// Server answered without a `text/event-stream` content type
    #[error(
        "Invalid content type: expected text/event-stream, got {}",
        .0.as_deref().unwrap_or("none")
    )]
    ContentType(Option<String>),

    /// Connection failed or dropped and the retry budget is spent
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Stream configuration rejected before connecting
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The default HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl StreamError {
    /// Whether the reconnect loop may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Transport-level failures: refused, timed out or reset connections
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error while reading the body
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl TransportError {
    /// Create a connection failure from a message
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }
}
