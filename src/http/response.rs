//! Responses delivered to [`ResponseHandle`](crate::ResponseHandle)s.
//!
//! Every submitted request resolves to exactly one [`Response`]. Network
//! outcomes the pipeline could not turn into a real HTTP response are
//! reported as *failure responses*: status [`FAILURE_STATUS`], the error
//! text as `reason`, empty headers and body, and a [`FailureKind`] saying
//! what went wrong.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

use super::request::{Meta, Request};
use super::transport::RawResponse;

// ============================================================================
// Constants
// ============================================================================

/// Status carried by synthetic failure responses.
pub const FAILURE_STATUS: i32 = -1;

// ============================================================================
// FailureKind
// ============================================================================

/// Why a response is a synthetic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Every attempt exceeded the per-attempt timeout.
    Timeout,
    /// A non-timeout error aborted the request.
    Transport,
    /// The client shut down before the request could finish.
    Closed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Result of one submitted request.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL (after redirects), or the request URL for failures.
    pub url: Url,
    /// HTTP status code, or [`FAILURE_STATUS`].
    pub status: i32,
    /// Reason phrase, or the error text for failures.
    pub reason: String,
    /// Response headers (empty for failures).
    pub headers: HeaderMap,
    /// Response body (empty for failures).
    pub body: Vec<u8>,
    /// The request this response answers.
    pub request: Arc<Request>,
    /// Metadata copied from the request.
    pub meta: Meta,
    /// Set when this is a synthetic failure.
    pub failure: Option<FailureKind>,
}

impl Response {
    /// Builds a normal response from a transport result.
    pub(crate) fn from_raw(request: &Arc<Request>, raw: RawResponse) -> Self {
        Self {
            url: raw.url,
            status: i32::from(raw.status),
            reason: raw.reason,
            headers: raw.headers,
            body: raw.body,
            request: Arc::clone(request),
            meta: request.meta().clone(),
            failure: None,
        }
    }

    /// Builds a synthetic failure response.
    pub(crate) fn failure(request: &Arc<Request>, kind: FailureKind, error: &Error) -> Self {
        Self {
            url: request.url().clone(),
            status: FAILURE_STATUS,
            reason: error.to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            request: Arc::clone(request),
            meta: request.meta().clone(),
            failure: Some(kind),
        }
    }

    /// Returns `true` for synthetic failure responses.
    #[inline]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Returns `true` for real responses with a 2xx status.
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none() && self.status >= 200 && self.status < 300
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body deserialized from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Response {} {}>", self.status, self.url)
    }
}

// ============================================================================
// Tests
// ============================================================================
