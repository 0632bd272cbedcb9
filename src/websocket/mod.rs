//! Duplex WebSocket endpoints.
//!
//! [`WebSocketServer`] and [`WebSocketClient`] are symmetric: each owns one
//! loop thread serving one session at a time, an overwrite-oldest outbound
//! queue fed by [`send`](WebSocketServer::send) from any thread, and typed
//! inbound callbacks.
//!
//! # Example
//!
//! ```no_run
//! use reqbridge::{WebSocketClient, WebSocketServer};
//!
//! # fn example() -> reqbridge::Result<()> {
//! let server = WebSocketServer::builder().route("/test").serve()?;
//! let client = WebSocketClient::builder()
//!     .port(server.port())
//!     .route("/test")
//!     .on_text(|text, _| println!("text: {text}"))
//!     .on_json(|value, _| println!("json: {value}"))
//!     .on_binary(|bytes, _| println!("{} bytes", bytes.len()))
//!     .connect()?;
//!
//! server.send("str");
//! server.send(b"bytes".to_vec());
//! server.send(serde_json::json!({"k": "v"}));
//! server.join();
//! # drop(client);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`WebSocketBuilder`] shared by both endpoints |
//! | `callbacks` | Callback types and dispatch |
//! | `client` | [`WebSocketClient`] |
//! | `payload` | [`Payload`] and frame classification |
//! | `queue` | Outbound queue and [`Outbox`] |
//! | `server` | [`WebSocketServer`] |
//! | `session` | Session loop |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint builder.
pub mod builder;

/// Inbound callbacks.
pub mod callbacks;

/// Client endpoint.
pub mod client;

mod endpoint;

/// Payload types.
pub mod payload;

/// Outbound queue.
pub mod queue;

/// Server endpoint.
pub mod server;

mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_HOST, DEFAULT_ROUTE, WebSocketBuilder};
pub use callbacks::{BinaryCallback, JsonCallback, TextCallback};
pub use client::WebSocketClient;
pub use payload::Payload;
pub use queue::Outbox;
pub use server::WebSocketServer;
