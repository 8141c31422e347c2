//! Server-Sent Events client
//!
//! Connects to a `text/event-stream` endpoint and yields parsed events,
//! reconnecting with exponential backoff when the connection fails and
//! replaying the last seen event id.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use ssec::StreamConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StreamConfig::builder()
//!         .max_connect_attempts(5)
//!         .backoff_delay(1.5)
//!         .build();
//!
//!     let mut events = ssec::stream("http://localhost:8080/events", config)?;
//!     while let Some(event) = events.next().await {
//!         let event = event?;
//!         println!("{} {}", event.event_type, event.data_str());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! A server answering `204 No Content` ends the stream cleanly. Any other
//! non-200 status or a content type other than `text/event-stream` is fatal
//! and not retried.
//!
//! # Blocking
//!
//! [`blocking::stream`] returns an iterator with the same semantics for
//! callers without an async runtime.
//!
//! # Testing
//!
//! The `testing` module provides a scripted transport and an axum test server:
//!
//! ```rust,ignore
//! use ssec::testing::{Reply, ScriptedTransport};
//!
//! let transport = ScriptedTransport::new([Reply::events(["data: hi\n\n"])]);
//! let events = ssec::stream_with_transport(transport, "http://test/events", config)?;
//! ```

pub mod blocking;
mod client;
pub mod config;
mod error;
mod event;
pub mod streaming;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use client::{stream, stream_with_client, stream_with_transport, EventStream};
pub use config::{ConfigError, HttpMethod, StreamConfig, StreamConfigBuilder};
pub use error::{Result, StreamError, TransportError};
pub use event::{Event, DEFAULT_EVENT_TYPE};

// Re-export connection types for convenience
pub use supervisor::{ConnectionPhase, ReconnectionState, Supervisor};
pub use transport::{BlockingTransport, Transport};
