//! Builder pattern for WebSocket endpoints.
//!
//! The same builder configures either side; finish with
//! [`WebSocketBuilder::serve`] for a server or [`WebSocketBuilder::connect`]
//! for a client.
//!
//! # Example
//!
//! ```no_run
//! use reqbridge::WebSocketServer;
//!
//! # fn example() -> reqbridge::Result<()> {
//! let server = WebSocketServer::builder()
//!     .port(9000)
//!     .route("/events")
//!     .max_queue(64)
//!     .on_json(|value, outbox| outbox.send(value.clone()))
//!     .serve()?;
//!
//! server.send("hello");
//! server.join();
//! server.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

use super::callbacks::Callbacks;
use super::client::WebSocketClient;
use super::queue::Outbox;
use super::server::WebSocketServer;

// ============================================================================
// Constants
// ============================================================================

/// Default host to bind or dial.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default upgrade route.
pub const DEFAULT_ROUTE: &str = "/ws";

// ============================================================================
// WebSocketBuilder
// ============================================================================

/// Builder for [`WebSocketServer`] and [`WebSocketClient`].
#[derive(Clone)]
pub struct WebSocketBuilder {
    /// Host to bind (server) or dial (client).
    pub(crate) host: String,
    /// Port; 0 lets a server pick any free port.
    pub(crate) port: u16,
    /// Route upgraded to a WebSocket session.
    pub(crate) route: String,
    /// Outbound queue capacity; 0 means unbounded.
    pub(crate) max_queue: usize,
    /// Inbound callbacks.
    pub(crate) callbacks: Callbacks,
}

impl Default for WebSocketBuilder {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            route: DEFAULT_ROUTE.to_string(),
            max_queue: 0,
            callbacks: Callbacks::default(),
        }
    }
}

impl fmt::Debug for WebSocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("route", &self.route)
            .field("max_queue", &self.max_queue)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

// ============================================================================
// WebSocketBuilder Implementation
// ============================================================================

impl WebSocketBuilder {
    /// Creates a builder with the defaults (`127.0.0.1`, port 0, `/ws`,
    /// unbounded queue, no callbacks).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the route, e.g. `/ws`.
    #[must_use]
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Caps the outbound queue. When full, the oldest payload is dropped.
    #[inline]
    #[must_use]
    pub const fn max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    /// Registers a callback for text frames that are not JSON.
    #[must_use]
    pub fn on_text<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Outbox) + Send + Sync + 'static,
    {
        self.callbacks.push_text(Arc::new(callback));
        self
    }

    /// Registers a callback for binary frames.
    #[must_use]
    pub fn on_binary<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], &Outbox) + Send + Sync + 'static,
    {
        self.callbacks.push_binary(Arc::new(callback));
        self
    }

    /// Registers a callback for text frames holding JSON.
    #[must_use]
    pub fn on_json<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value, &Outbox) + Send + Sync + 'static,
    {
        self.callbacks.push_json(Arc::new(callback));
        self
    }

    /// Binds and starts a server.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the host or route is malformed
    /// - [`Error::Connection`] if the address cannot be bound
    pub fn serve(self) -> Result<WebSocketServer> {
        self.validate()?;
        WebSocketServer::start(self)
    }

    /// Starts a client that dials the configured server.
    ///
    /// Returns immediately; the client keeps retrying until the server
    /// accepts or the client is closed.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the host or route is malformed or the port is 0
    /// - [`Error::Io`] if the loop thread cannot be started
    pub fn connect(self) -> Result<WebSocketClient> {
        self.validate()?;
        if self.port == 0 {
            return Err(Error::config("a client needs a port to connect to"));
        }
        WebSocketClient::start(self)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl WebSocketBuilder {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if !self.route.starts_with('/') {
            return Err(Error::config(format!(
                "route must start with '/', got {:?}",
                self.route
            )));
        }
        Ok(())
    }

    /// `ws://host:port/route`
    pub(crate) fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.route)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = WebSocketBuilder::new();
        assert_eq!(builder.host, "127.0.0.1");
        assert_eq!(builder.port, 0);
        assert_eq!(builder.route, "/ws");
        assert_eq!(builder.max_queue, 0);
    }

    #[test]
    fn test_url() {
        let builder = WebSocketBuilder::new().port(20000).route("/test");
        assert_eq!(builder.url(), "ws://127.0.0.1:20000/test");
    }

    #[test]
    fn test_route_must_be_absolute() {
        let err = WebSocketBuilder::new().route("ws").serve().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_client_needs_port() {
        let err = WebSocketBuilder::new().connect().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_callbacks_accumulate() {
        let builder = WebSocketBuilder::new()
            .on_text(|_, _| {})
            .on_text(|_, _| {})
            .on_binary(|_, _| {});
        assert_eq!(
            format!("{:?}", builder.callbacks),
            "Callbacks { text: 2, binary: 1, json: 0 }"
        );
    }
}
