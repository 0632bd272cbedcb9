//! reqbridge - Blocking HTTP and WebSocket clients over a background event loop.
//!
//! Callers on ordinary threads submit work through blocking, thread-safe
//! handles; a dedicated background thread per bridge runs a single-threaded
//! tokio runtime that does the actual I/O.
//!
//! # Architecture
//!
//! - **HTTP**: [`Client::submit`] queues a [`Request`] and returns a
//!   [`ResponseHandle`]. The loop runs every request through a global and
//!   per-host throttle with per-attempt timeouts and timeout-only retries.
//!   Network failures come back as failure [`Response`]s, never as errors.
//! - **WebSocket**: [`WebSocketServer`] and [`WebSocketClient`] each serve
//!   one session at a time, with an overwrite-oldest outbound queue and
//!   typed inbound callbacks.
//!
//! # Quick Start
//!
//! ```no_run
//! use reqbridge::{Client, Request, Result};
//!
//! fn main() -> Result<()> {
//!     let client = Client::builder().concurrency(8).build()?;
//!
//!     let handle = client.request(
//!         Request::post("https://httpbin.org/post").json(serde_json::json!({"k": "v"})),
//!     )?;
//!
//!     let response = handle.wait()?;
//!     if response.is_failure() {
//!         eprintln!("failed: {}", response.reason);
//!     } else {
//!         println!("{}: {}", response.status, response.text());
//!     }
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], configuration, throttle and completion handles |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`http`] | [`Request`], [`Response`] and the [`Transport`] seam |
//! | [`websocket`] | [`WebSocketServer`], [`WebSocketClient`] and payloads |

// ============================================================================
// Modules
// ============================================================================

/// Concurrent HTTP client.
///
/// Use [`Client::builder()`] to configure one.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// HTTP request and response types.
pub mod http;

/// Dedicated loop threads.
pub(crate) mod runtime;

/// WebSocket server and client endpoints.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientConfig, ResponseHandle, Throttle, ThrottleGuard};

// Error types
pub use error::{Error, Result};

// HTTP types
pub use http::{
    Body, FAILURE_STATUS, FailureKind, Meta, Method, PreparedRequest, RawResponse, Request,
    RequestBuilder, RequestId, ReqwestTransport, Response, Transport,
};

// WebSocket types
pub use websocket::{Outbox, Payload, WebSocketBuilder, WebSocketClient, WebSocketServer};
