//! WebSocket client endpoint.
//!
//! The client dials `ws://host:port/route` from its loop thread and keeps
//! retrying every poll interval until the server accepts or the client is
//! closed, so it may be started before the server. Once its session ends
//! the loop finishes; a client serves exactly one session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, trace};

use crate::error::Result;
use crate::runtime::{LoopThread, POLL_INTERVAL, RunFlag, build_runtime};

use super::builder::WebSocketBuilder;
use super::endpoint::Endpoint;
use super::payload::Payload;
use super::queue::Outbox;
use super::session::Session;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// WebSocketClient
// ============================================================================

/// A WebSocket client running its session on a background thread.
///
/// Closed by [`WebSocketClient::close`] or on drop.
pub struct WebSocketClient {
    endpoint: Endpoint,
    url: String,
}

impl fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebSocketClient - Public API
// ============================================================================

impl WebSocketClient {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> WebSocketBuilder {
        WebSocketBuilder::new()
    }

    /// Queues `payload`; it is sent once connected. Never blocks.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.endpoint.send(payload.into());
    }

    /// Blocks until everything queued so far has been sent or evicted.
    ///
    /// Must not be called from a callback.
    pub fn join(&self) {
        self.endpoint.join();
    }

    /// Like [`WebSocketClient::join`], giving up after `timeout`.
    ///
    /// Returns `true` if the queue drained in time.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        self.endpoint.join_timeout(timeout)
    }

    /// A sending handle that can be moved to other threads.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.endpoint.outbox()
    }

    /// Returns `true` while the session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Returns `true` once [`WebSocketClient::close`] has been called or
    /// the session has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// The URL being dialled.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends a close frame, stops the loop and waits for it. Idempotent.
    ///
    /// Payloads still queued are discarded.
    pub fn close(&self) {
        self.endpoint.close();
    }
}

// ============================================================================
// WebSocketClient - Internal
// ============================================================================

impl WebSocketClient {
    pub(crate) fn start(builder: WebSocketBuilder) -> Result<Self> {
        let url = builder.url();
        let runtime = build_runtime()?;
        let session = Session::new("client", builder.max_queue, builder.callbacks);

        let thread = {
            let session = session.clone();
            let url = url.clone();
            LoopThread::spawn("reqbridge-ws-client", runtime, move |running| {
                connect_loop(running, url, session)
            })?
        };

        info!(url = %url, "WebSocket client started");

        Ok(Self {
            endpoint: Endpoint::new(session, thread),
            url,
        })
    }
}

// ============================================================================
// Connect Loop
// ============================================================================

/// Dials until connected, serves the session, then returns.
///
/// Once the session is over nothing can be sent any more, so the queue is
/// closed: later pushes are dropped and `join` returns.
async fn connect_loop(running: RunFlag, url: String, session: Session) {
    let mut attempts = 0u32;

    while running.is_running() {
        attempts += 1;
        match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((socket, _))) => {
                info!(url = %url, attempts, "WebSocket connected");
                let end = session.run(socket, &running).await;
                let discarded = session.queue().close();
                info!(url = %url, ?end, discarded, "WebSocket client finished");
                return;
            }
            Ok(Err(e)) if attempts == 1 => {
                debug!(url = %url, error = %e, "Connect failed; retrying");
            }
            Ok(Err(e)) => trace!(url = %url, attempts, error = %e, "Connect failed"),
            Err(_) => debug!(url = %url, attempts, "Connect timed out"),
        }
        sleep(POLL_INTERVAL).await;
    }

    debug!(url = %url, "Client stopped before connecting");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_while_dialling() {
        // Nothing listens on this port.
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let client = WebSocketClient::builder().port(port).connect().unwrap();
        assert_eq!(client.url(), format!("ws://127.0.0.1:{port}/ws"));
        std::thread::sleep(POLL_INTERVAL * 3);
        assert!(!client.is_connected());

        client.send("queued");
        client.close();
        assert!(client.is_closed());
        assert!(client.join_timeout(Duration::ZERO));
    }
}
