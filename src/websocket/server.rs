//! WebSocket server endpoint.
//!
//! # Connection Flow
//!
//! 1. [`WebSocketBuilder::serve`] binds the listener on the caller thread
//! 2. The loop thread accepts one TCP connection at a time
//! 3. The handshake upgrades only the configured route; any other path is
//!    answered with `404 Not Found`
//! 4. The session runs until the peer leaves or the server is closed, then
//!    the next connection is accepted

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::runtime::{LoopThread, POLL_INTERVAL, RunFlag, build_runtime};

use super::builder::WebSocketBuilder;
use super::endpoint::Endpoint;
use super::payload::Payload;
use super::queue::Outbox;
use super::session::Session;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on a single upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// WebSocketServer
// ============================================================================

/// A WebSocket server serving one session at a time on a background thread.
///
/// Closed by [`WebSocketServer::close`] or on drop.
pub struct WebSocketServer {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    route: String,
}

impl fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("local_addr", &self.local_addr)
            .field("route", &self.route)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebSocketServer - Public API
// ============================================================================

impl WebSocketServer {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> WebSocketBuilder {
        WebSocketBuilder::new()
    }

    /// Queues `payload` for the current (or next) session. Never blocks.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.endpoint.send(payload.into());
    }

    /// Blocks until everything queued so far has been sent or evicted.
    ///
    /// Must not be called from a callback.
    pub fn join(&self) {
        self.endpoint.join();
    }

    /// Like [`WebSocketServer::join`], giving up after `timeout`.
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

    /// Returns `true` while a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Returns `true` once [`WebSocketServer::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// Address the listener is bound to.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the listener is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// URL clients should dial.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.route)
    }

    /// Sends a close frame, stops the loop and waits for it. Idempotent.
    ///
    /// Payloads still queued are discarded.
    pub fn close(&self) {
        self.endpoint.close();
    }
}

// ============================================================================
// WebSocketServer - Internal
// ============================================================================

impl WebSocketServer {
    pub(crate) fn start(builder: WebSocketBuilder) -> Result<Self> {
        let runtime = build_runtime()?;
        let listener = runtime
            .block_on(TcpListener::bind((builder.host.as_str(), builder.port)))
            .map_err(|e| {
                Error::connection(format!("bind {}:{} failed: {e}", builder.host, builder.port))
            })?;
        let local_addr = listener.local_addr()?;

        let session = Session::new("server", builder.max_queue, builder.callbacks);
        let route = builder.route;

        let thread = {
            let session = session.clone();
            let route = route.clone();
            LoopThread::spawn("reqbridge-ws-server", runtime, move |running| {
                accept_loop(running, listener, route, session)
            })?
        };

        info!(%local_addr, route = %route, "WebSocket server listening");

        Ok(Self {
            endpoint: Endpoint::new(session, thread),
            local_addr,
            route,
        })
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

/// Accepts and serves connections one at a time until stopped.
async fn accept_loop(running: RunFlag, listener: TcpListener, route: String, session: Session) {
    debug!("Accept loop started");

    while running.is_running() {
        match timeout(POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                debug!(?addr, "TCP connection accepted");
                match upgrade(stream, &route).await {
                    Ok(socket) => {
                        info!(?addr, "WebSocket connection established");
                        session.run(socket, &running).await;
                    }
                    Err(e) => warn!(error = %e, ?addr, "WebSocket upgrade failed"),
                }
            }
            Ok(Err(e)) => error!(error = %e, "Accept failed"),
            Err(_) => {}
        }
    }

    debug!("Accept loop terminated");
}

/// Performs the handshake, accepting only `route`.
async fn upgrade(stream: TcpStream, route: &str) -> Result<WebSocketStream<TcpStream>> {
    let check_route = |request: &Request, response: Response| {
        let path = request.uri().path();
        if path == route {
            Ok(response)
        } else {
            warn!(path, expected = route, "Rejected upgrade for unknown route");
            let mut rejection = ErrorResponse::new(Some(format!("no WebSocket route at {path}")));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::accept_hdr_async(stream, check_route),
    )
    .await
    .map_err(|_| Error::timeout("WebSocket handshake", millis(HANDSHAKE_TIMEOUT)))?
    .map_err(Error::from)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_any_port() {
        let server = WebSocketServer::builder().route("/test").serve().unwrap();

        assert!(server.port() > 0);
        assert_eq!(server.local_addr().ip().to_string(), "127.0.0.1");
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}/test", server.port()));
        assert!(!server.is_connected());

        server.close();
        assert!(server.is_closed());
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = WebSocketServer::builder().serve().unwrap();
        let err = WebSocketServer::builder()
            .port(first.port())
            .serve()
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_send_without_peer_stays_queued() {
        let server = WebSocketServer::builder().max_queue(2).serve().unwrap();
        server.send("a");
        server.send("b");
        server.send("c");

        assert_eq!(server.outbox().len(), 2);
        assert!(!server.join_timeout(Duration::from_millis(20)));

        server.close();
        // Close discards what is left, so join no longer blocks.
        server.join();
    }
}
