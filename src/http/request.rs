//! Request descriptors.
//!
//! A [`Request`] is immutable once built. [`RequestBuilder::build`] performs
//! every check that can be made without touching the network, so a
//! malformed submission fails on the caller thread instead of producing a
//! failure response later.
//!
//! # Example
//!
//! ```
//! use reqbridge::Request;
//!
//! # fn example() -> reqbridge::Result<()> {
//! let request = Request::post("http://localhost:8080/items")
//!     .header("X-Trace", "1")
//!     .json(serde_json::json!({"name": "widget"}))
//!     .retry(3)
//!     .build()?;
//! assert_eq!(request.host(), "localhost");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Opaque caller metadata echoed back on the [`Response`](super::Response).
pub type Meta = Map<String, Value>;

// ============================================================================
// RequestId
// ============================================================================

/// Unique identifier attached to every request, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Body
// ============================================================================

/// The single body a request may carry.
///
/// Exactly one variant can be attached to a request; the builder rejects
/// requests that set more than one.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Raw bytes, sent as `application/octet-stream`.
    Bytes(Vec<u8>),
    /// Structured data, serialized as `application/json`.
    Json(Value),
    /// Text, sent as `text/plain; charset=utf-8`.
    Text(String),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
    /// A file streamed in chunks, sent as `application/octet-stream`.
    File(PathBuf),
}

impl Body {
    /// Short name of the variant, used in messages and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Text(_) => "text",
            Self::Form(_) => "form",
            Self::File(_) => "file",
        }
    }

    /// Content type applied when the caller did not set one.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Bytes(_) | Self::File(_) => "application/octet-stream",
            Self::Json(_) => "application/json",
            Self::Text(_) => "text/plain; charset=utf-8",
            Self::Form(_) => "application/x-www-form-urlencoded",
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// An immutable, validated request descriptor.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    method: Method,
    url: Url,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Option<Duration>,
    retry: Option<u32>,
    meta: Meta,
}

impl Request {
    /// Starts a request with an arbitrary method name.
    #[must_use]
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Starts a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new("GET", url)
    }

    /// Starts a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new("POST", url)
    }

    /// Unique request ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// HTTP method.
    #[inline]
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    #[inline]
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Host identity used for per-host throttling.
    ///
    /// Empty for URLs without a host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Request-level headers (merged over the client defaults at send time).
    #[inline]
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request-level cookies (merged over the client defaults at send time).
    #[inline]
    #[must_use]
    pub const fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Query parameters appended to the URL.
    #[inline]
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// The body, if any.
    #[inline]
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Per-attempt timeout override.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Retry-count override.
    #[inline]
    #[must_use]
    pub const fn retry(&self) -> Option<u32> {
        self.retry
    }

    /// Caller metadata.
    #[inline]
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request {} {}>", self.method, self.url)
    }
}

// ============================================================================
// RequestBuilder
// ============================================================================

/// Fluent builder for [`Request`].
///
/// Nothing is validated until [`RequestBuilder::build`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    query: Vec<(String, String)>,
    bodies: Vec<Body>,
    timeout: Option<Duration>,
    retry: Option<u32>,
    meta: Meta,
}

impl RequestBuilder {
    /// Creates a builder for `method` and `url`.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            query: Vec::new(),
            bodies: Vec::new(),
            timeout: None,
            retry: None,
            meta: Meta::new(),
        }
    }

    /// Adds a header. Overrides the client default with the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie. Overrides the client default with the same name.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a raw byte body.
    #[must_use]
    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.bodies.push(Body::Bytes(bytes.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, value: Value) -> Self {
        self.bodies.push(Body::Json(value));
        self
    }

    /// Sets a text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.bodies.push(Body::Text(text.into()));
        self
    }

    /// Sets a URL-encoded form body.
    #[must_use]
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.bodies.push(Body::Form(fields));
        self
    }

    /// Streams the file at `path` as the body.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bodies.push(Body::File(path.into()));
        self
    }

    /// Overrides the client's per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the client's retry count. `0` disables retries.
    #[must_use]
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Attaches a metadata entry echoed back on the response.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Validates and builds the request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL does not parse
    /// - [`Error::InvalidRequest`] if the method, a header, a cookie or the
    ///   timeout is malformed, if more than one body is set, or if a GET/HEAD request
    ///   carries a body
    pub fn build(self) -> Result<Request> {
        let method = parse_method(&self.method)?;
        let url = Url::parse(self.url.trim()).map_err(|e| Error::invalid_url(&self.url, e))?;
        let headers = parse_headers(&self.headers)?;
        let cookies = parse_cookies(self.cookies)?;
        let body = single_body(&method, self.bodies)?;

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_request("timeout must be greater than zero"));
        }

        Ok(Request {
            id: RequestId::generate(),
            method,
            url,
            headers,
            cookies,
            query: self.query,
            body,
            timeout: self.timeout,
            retry: self.retry,
            meta: self.meta,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_uppercase().as_bytes())
        .map_err(|e| Error::invalid_request(format!("invalid method {method:?}: {e}")))
}

/// Parses `(name, value)` pairs into a header map.
pub(crate) fn parse_headers(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::invalid_request(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            Error::invalid_request(format!("invalid value for header {name:?}: {e}"))
        })?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Collects cookies, last write winning, rejecting pairs that cannot be
/// rendered into a `Cookie` header.
pub(crate) fn parse_cookies(pairs: Vec<(String, String)>) -> Result<BTreeMap<String, String>> {
    let mut cookies = BTreeMap::new();
    for (name, value) in pairs {
        if name.is_empty() || name.contains(['=', ';', ' ']) {
            return Err(Error::invalid_request(format!("invalid cookie name {name:?}")));
        }
        if value.contains(';') || HeaderValue::from_str(&value).is_err() {
            return Err(Error::invalid_request(format!(
                "invalid value for cookie {name:?}"
            )));
        }
        cookies.insert(name, value);
    }
    Ok(cookies)
}

/// Enforces "at most one body, none for GET/HEAD".
fn single_body(method: &Method, mut bodies: Vec<Body>) -> Result<Option<Body>> {
    if bodies.len() > 1 {
        let kinds: Vec<&str> = bodies.iter().map(Body::kind).collect();
        return Err(Error::invalid_request(format!(
            "{method} requires at most one request body, got {}",
            kinds.join(", ")
        )));
    }

    let body = bodies.pop();
    if body.is_some() && (*method == Method::GET || *method == Method::HEAD) {
        return Err(Error::invalid_request(format!(
            "{method} does not have a request body"
        )));
    }
    Ok(body)
}

// ============================================================================
// Tests
// ============================================================================
