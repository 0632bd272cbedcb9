//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use reqbridge::Client;
//!
//! # fn example() -> reqbridge::Result<()> {
//! let client = Client::builder()
//!     .timeout(Duration::from_secs(5))
//!     .retry(2)
//!     .concurrency(16)
//!     .concurrency_per_host(4)
//!     .header("Accept", "application/json")
//!     .cookie("session", "abc")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::request::{parse_cookies, parse_headers};
use crate::http::{ReqwestTransport, Transport};

use super::config::{ClientConfig, merge_headers};
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder. Unset values fall back
/// to the defaults in [`config`](super::config).
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Per-attempt timeout.
    timeout: Option<Duration>,
    /// Retries after a timed-out attempt.
    retry: Option<u32>,
    /// Global concurrency cap.
    concurrency: Option<usize>,
    /// Per-host concurrency cap.
    concurrency_per_host: Option<usize>,
    /// Header overrides, merged over the default headers.
    headers: Vec<(String, String)>,
    /// Default cookies.
    cookies: Vec<(String, String)>,
    /// Custom transport; reqwest when unset.
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("concurrency", &self.concurrency)
            .field("concurrency_per_host", &self.concurrency_per_host)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with no overrides.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default per-attempt timeout.
    #[inline]
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default number of retries after a timed-out attempt.
    #[inline]
    #[must_use]
    pub const fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the maximum number of requests executing at once.
    #[inline]
    #[must_use]
    pub const fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets the maximum number of requests executing at once per host.
    #[inline]
    #[must_use]
    pub const fn concurrency_per_host(mut self, per_host: usize) -> Self {
        self.concurrency_per_host = Some(per_host);
        self
    }

    /// Adds a default header, replacing the built-in one with the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a default cookie.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Replaces the reqwest transport, e.g. with an in-memory one for tests.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration and starts the client loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if a cap or the timeout is zero, or a default
    ///   header or cookie is malformed
    /// - [`Error::Http`] if the reqwest client cannot be created
    /// - [`Error::Io`] if the runtime or loop thread cannot be started
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport.clone() {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?) as Arc<dyn Transport>,
        };
        let config = self.into_config()?;
        Client::start(config, transport)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Resolves overrides against the defaults.
    fn into_config(self) -> Result<ClientConfig> {
        let defaults = ClientConfig::default();

        let timeout = self.timeout.unwrap_or(defaults.timeout);
        if timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }

        let concurrency = self.concurrency.unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }

        let concurrency_per_host = self
            .concurrency_per_host
            .unwrap_or(defaults.concurrency_per_host);
        if concurrency_per_host == 0 {
            return Err(Error::config("concurrency_per_host must be at least 1"));
        }

        let overrides =
            parse_headers(&self.headers).map_err(|e| Error::config(e.to_string()))?;
        let cookies = parse_cookies(self.cookies).map_err(|e| Error::config(e.to_string()))?;

        Ok(ClientConfig {
            timeout,
            retry: self.retry.unwrap_or(defaults.retry),
            concurrency,
            concurrency_per_host,
            headers: merge_headers(&defaults.headers, &overrides),
            cookies,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use reqwest::header::{ACCEPT, USER_AGENT};

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ClientBuilder::new();
        assert!(builder.timeout.is_none());
        assert!(builder.headers.is_empty());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_unset_values_use_defaults() {
        let config = ClientBuilder::new().into_config().unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_overrides_applied() {
        let config = ClientBuilder::new()
            .timeout(Duration::from_secs(3))
            .retry(0)
            .concurrency(10)
            .concurrency_per_host(5)
            .header("accept", "application/json")
            .cookie("ck", "cv")
            .into_config()
            .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.retry(), 0);
        assert_eq!(config.concurrency(), 10);
        assert_eq!(config.concurrency_per_host(), 5);
        assert_eq!(config.headers()[ACCEPT], "application/json");
        assert_eq!(config.headers().get_all(ACCEPT).iter().count(), 1);
        assert!(config.headers().contains_key(USER_AGENT));
        assert_eq!(config.cookies().get("ck").map(String::as_str), Some("cv"));
    }

    #[test]
    fn test_zero_caps_rejected() {
        let err = ClientBuilder::new().concurrency(0).into_config().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ClientBuilder::new()
            .concurrency_per_host(0)
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("concurrency_per_host"));

        let err = ClientBuilder::new()
            .timeout(Duration::ZERO)
            .into_config()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_invalid_default_header_rejected() {
        let err = ClientBuilder::new()
            .header("bad header", "x")
            .into_config()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
