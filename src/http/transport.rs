//! HTTP transport seam.
//!
//! The pipeline never speaks HTTP itself. It hands a [`PreparedRequest`]
//! (defaults already merged) to a [`Transport`] and gets back a
//! [`RawResponse`] or an error. One attempt = one `execute` call; retries
//! and timeouts are the caller's business.
//!
//! [`ReqwestTransport`] is the default implementation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::Stream;
use futures_util::stream;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::trace;
use url::Url;

use crate::error::Result;

use super::request::{Body, RequestId};

// ============================================================================
// Constants
// ============================================================================

/// Size of the chunks a streamed file body is read in.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

/// A request with client defaults applied, ready for the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// ID of the originating request.
    pub id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Query parameters to append.
    pub query: Vec<(String, String)>,
    /// Effective headers, including the rendered `Cookie` header.
    pub headers: HeaderMap,
    /// Body to send, if any.
    pub body: Option<Body>,
}

/// What a transport returns for one completed attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final URL.
    pub url: Url,
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Fully read body.
    pub body: Vec<u8>,
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Executes one HTTP attempt.
///
/// Implementations run on the client's loop thread. They should return
/// errors rather than panic; an error that reports itself as a timeout
/// ([`Error::is_timeout`](crate::Error::is_timeout)) is retried like an
/// expired attempt, anything else aborts the request.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and reads the full response.
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse>;
}

// ============================================================================
// ReqwestTransport
// ============================================================================

/// [`Transport`] backed by a shared [`reqwest::Client`] connection pool.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// No client-level timeout is configured: the pipeline bounds every
    /// attempt itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`](crate::Error::Http) if the TLS backend
    /// cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    #[inline]
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            builder = attach_body(builder, body, &request.headers);
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        trace!(id = %request.id, status = status.as_u16(), len = body.len(), "Response read");

        Ok(RawResponse {
            url,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Attaches `body` and its default content type to a reqwest builder.
fn attach_body(
    builder: reqwest::RequestBuilder,
    body: &Body,
    headers: &HeaderMap,
) -> reqwest::RequestBuilder {
    let builder = if headers.contains_key(CONTENT_TYPE) {
        builder
    } else {
        builder.header(CONTENT_TYPE, body.content_type())
    };

    match body {
        Body::Bytes(bytes) => builder.body(bytes.clone()),
        Body::Json(value) => builder.json(value),
        Body::Text(text) => builder.body(text.clone()),
        Body::Form(fields) => builder.form(fields),
        Body::File(path) => builder.body(reqwest::Body::wrap_stream(file_chunks(path.clone()))),
    }
}

// ============================================================================
// File Chunks
// ============================================================================

enum ChunkState {
    Unopened(PathBuf),
    Reading(File),
    Done,
}

/// Reads the file at `path` as a stream of [`FILE_CHUNK_SIZE`] chunks.
///
/// The file is opened lazily on first poll. An open or read error is
/// yielded once and ends the stream.
pub fn file_chunks(path: PathBuf) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    stream::unfold(ChunkState::Unopened(path), |state| async move {
        let mut file = match state {
            ChunkState::Unopened(path) => match File::open(&path).await {
                Ok(file) => file,
                Err(e) => return Some((Err(e), ChunkState::Done)),
            },
            ChunkState::Reading(file) => file,
            ChunkState::Done => return None,
        };

        let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
        match file.read(&mut chunk).await {
            Ok(0) => None,
            Ok(n) => {
                chunk.truncate(n);
                Some((Ok(chunk), ChunkState::Reading(file)))
            }
            Err(e) => Some((Err(e), ChunkState::Done)),
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
