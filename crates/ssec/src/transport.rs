//! HTTP transport seam
//!
//! The stream drivers only need to open a request and read body bytes. Both
//! disciplines have a trait here, implemented for the matching reqwest client.

use std::io::Read;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use url::Url;

use crate::config::HttpMethod;
use crate::error::TransportError;

/// Async response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Blocking response body
pub type BlockingBody = Box<dyn Read + Send>;

/// Everything needed to open one connection attempt
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    /// Largest chunk the body should yield at once
    pub chunk_size: usize,
}

/// An opened response, before validation
pub struct OpenedStream<B> {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: B,
}

impl<B> std::fmt::Debug for OpenedStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Opens streaming requests for the async driver
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ConnectRequest)
        -> Result<OpenedStream<ByteStream>, TransportError>;
}

/// Opens streaming requests for the blocking driver
pub trait BlockingTransport {
    fn open(&self, request: &ConnectRequest)
        -> Result<OpenedStream<BlockingBody>, TransportError>;
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Split a chunk into pieces of at most `size` bytes
fn rechunk(chunk: Bytes, size: usize) -> Vec<Bytes> {
    if chunk.len() <= size {
        return vec![chunk];
    }
    let mut pieces = Vec::with_capacity(chunk.len().div_ceil(size));
    let mut rest = chunk;
    while rest.len() > size {
        pieces.push(rest.split_to(size));
    }
    pieces.push(rest);
    pieces
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn open(
        &self,
        request: &ConnectRequest,
    ) -> Result<OpenedStream<ByteStream>, TransportError> {
        let response = self
            .request(request.method.into(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = content_type(response.headers());
        let chunk_size = request.chunk_size.max(1);

        let body = response
            .bytes_stream()
            .flat_map(move |item| {
                let pieces: Vec<Result<Bytes, TransportError>> = match item {
                    Ok(chunk) => rechunk(chunk, chunk_size).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(TransportError::from(e))],
                };
                stream::iter(pieces)
            })
            .boxed();

        Ok(OpenedStream {
            status,
            content_type,
            body,
        })
    }
}

impl BlockingTransport for reqwest::blocking::Client {
    fn open(
        &self,
        request: &ConnectRequest,
    ) -> Result<OpenedStream<BlockingBody>, TransportError> {
        let response = self
            .request(request.method.into(), request.url.clone())
            .headers(request.headers.clone())
            .send()?;

        Ok(OpenedStream {
            status: response.status().as_u16(),
            content_type: content_type(response.headers()),
            body: Box::new(response),
        })
    }
}
