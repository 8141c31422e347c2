//! Test utilities for ssec
//!
//! Two ways to exercise a stream without a real event source:
//!
//! - [`ScriptedTransport`] answers each connection attempt from a script of
//!   [`Reply`] values, for both the async and the blocking driver.
//! - [`TestServer`] serves an axum router on an ephemeral port.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::net::TcpListener;

use crate::error::TransportError;
use crate::supervisor::SSE_CONTENT_TYPE;
use crate::transport::{
    BlockingBody, BlockingTransport, ByteStream, ConnectRequest, OpenedStream, Transport,
};

/// How a scripted connection attempt is answered
#[derive(Debug, Clone)]
pub enum Reply {
    /// Opening the request fails
    Fail(String),
    /// A response is returned
    Respond {
        status: u16,
        content_type: Option<String>,
        chunks: Vec<Bytes>,
        /// Error raised after the last chunk instead of a clean end
        then_fail: Option<String>,
    },
}

impl Reply {
    /// Opening the request fails with a connection error
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    /// A valid event stream delivering `chunks`, then ending cleanly
    pub fn events<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self::Respond {
            status: 200,
            content_type: Some(SSE_CONTENT_TYPE.to_string()),
            chunks: chunks.into_iter().map(Into::into).collect(),
            then_fail: None,
        }
    }

    /// A response with the given status and no body
    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            content_type: Some(SSE_CONTENT_TYPE.to_string()),
            chunks: Vec::new(),
            then_fail: None,
        }
    }

    /// 204 No Content
    pub fn no_content() -> Self {
        Self::status(204)
    }

    /// Replace the content type of a response
    pub fn content_type(self, value: impl Into<String>) -> Self {
        match self {
            Self::Respond {
                status,
                chunks,
                then_fail,
                ..
            } => Self::Respond {
                status,
                content_type: Some(value.into()),
                chunks,
                then_fail,
            },
            fail => fail,
        }
    }

    /// Drop the connection with an error after the last chunk
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        match self {
            Self::Respond {
                status,
                content_type,
                chunks,
                ..
            } => Self::Respond {
                status,
                content_type,
                chunks,
                then_fail: Some(message.into()),
            },
            fail => fail,
        }
    }
}

/// Transport answering attempts from a script.
///
/// Cloning shares the script and the request log. Once the script runs out
/// every attempt gets 204, which ends the stream.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<ConnectRequest>>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connection attempts made so far
    pub fn attempts(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_reply(&self, request: &ConnectRequest) -> Reply {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(Reply::no_content)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        request: &ConnectRequest,
    ) -> Result<OpenedStream<ByteStream>, TransportError> {
        match self.next_reply(request) {
            Reply::Fail(message) => Err(TransportError::ConnectionFailed(message)),
            Reply::Respond {
                status,
                content_type,
                chunks,
                then_fail,
            } => {
                let tail = then_fail.map(|message| Err(TransportError::ConnectionFailed(message)));
                let body = stream::iter(chunks.into_iter().map(Ok).chain(tail)).boxed();
                Ok(OpenedStream {
                    status,
                    content_type,
                    body,
                })
            }
        }
    }
}

impl BlockingTransport for ScriptedTransport {
    fn open(
        &self,
        request: &ConnectRequest,
    ) -> Result<OpenedStream<BlockingBody>, TransportError> {
        match self.next_reply(request) {
            Reply::Fail(message) => Err(TransportError::ConnectionFailed(message)),
            Reply::Respond {
                status,
                content_type,
                chunks,
                then_fail,
            } => Ok(OpenedStream {
                status,
                content_type,
                body: Box::new(ScriptedBody {
                    chunks: chunks.into(),
                    then_fail,
                }),
            }),
        }
    }
}

/// Blocking body that hands out scripted chunks, at most one per read
struct ScriptedBody {
    chunks: VecDeque<Bytes>,
    then_fail: Option<String>,
}

impl Read for ScriptedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(chunk) = self.chunks.front_mut() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk.split_to(n));
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
            return Ok(n);
        }
        match self.then_fail.take() {
            Some(message) => Err(io::Error::new(io::ErrorKind::ConnectionReset, message)),
            None => Ok(0),
        }
    }
}

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on the current runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use ssec::testing::TestServer;
    ///
    /// let server = TestServer::start(Router::new().route("/events", get(handler))).await?;
    /// let events = ssec::stream(&server.url("/events"), StreamConfig::default())?;
    /// ```
    pub async fn start(router: axum::Router) -> std::io::Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            thread: None,
        })
    }

    /// Serve an axum Router from a dedicated thread with its own runtime.
    ///
    /// For tests driving the blocking client, which must not run inside an
    /// async context.
    pub fn start_detached(router: axum::Router) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0"))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let thread = std::thread::spawn(move || {
            runtime.block_on(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .ok();
            });
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: None,
            thread: Some(thread),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a path on the test server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal if not already done
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Abort the task if still running
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        // A detached server is left to wind down on its own thread
        self.thread.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_content_router() -> axum::Router {
        axum::Router::new().route(
            "/events",
            axum::routing::get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
    }

    #[tokio::test]
    async fn test_server_url() {
        let server = TestServer::start(no_content_router()).await.unwrap();

        let url = server.url("/events");
        assert_eq!(url, format!("http://127.0.0.1:{}/events", server.addr.port()));

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 204);
    }

    #[test]
    fn test_detached_server_serves_blocking_requests() {
        let server = TestServer::start_detached(no_content_router()).unwrap();

        let response = reqwest::blocking::get(server.url("/events")).unwrap();
        assert_eq!(response.status(), 204);
    }

    #[test]
    fn test_scripted_body_reads() {
        let mut body = ScriptedBody {
            chunks: vec![Bytes::from_static(b"abcde")].into(),
            then_fail: Some("reset".into()),
        };
        let mut buf = [0u8; 3];
        assert_eq!(body.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(body.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");
        assert_eq!(
            body.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::ConnectionReset
        );
        assert_eq!(body.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_reply_builders() {
        match Reply::events(["data: x\n\n"])
            .content_type("text/plain")
            .then_fail("boom")
        {
            Reply::Respond {
                status,
                content_type,
                chunks,
                then_fail,
            } => {
                assert_eq!(status, 200);
                assert_eq!(content_type.as_deref(), Some("text/plain"));
                assert_eq!(chunks, vec![Bytes::from_static(b"data: x\n\n")]);
                assert_eq!(then_fail.as_deref(), Some("boom"));
            }
            Reply::Fail(_) => panic!("expected a response"),
        }
    }
}
