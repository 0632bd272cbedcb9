//! Duplex session loop shared by the server and the client.
//!
//! One session serves one socket until the peer closes it, an I/O error
//! occurs, or the endpoint is stopped:
//!
//! ```text
//! loop while running
//!   ├─ flush outbound queue   (send, task_done)
//!   └─ select!
//!        ├─ inbound frame  → classify → callbacks
//!        ├─ queue push     → next iteration
//!        └─ poll interval  → re-check run flag
//! on stop: send close frame
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::sleep;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::runtime::{POLL_INTERVAL, RunFlag};

use super::callbacks::Callbacks;
use super::payload::{Inbound, classify};
use super::queue::{OutboundQueue, Outbox};

// ============================================================================
// Types
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The endpoint was stopped.
    Stopped,
    /// The peer closed the socket.
    Closed,
    /// Reading or writing failed.
    Failed,
}

// ============================================================================
// Session
// ============================================================================

/// State shared between an endpoint and every session its loop runs.
#[derive(Clone)]
pub(crate) struct Session {
    /// Endpoint name for logs.
    role: &'static str,
    queue: Arc<OutboundQueue>,
    callbacks: Arc<Callbacks>,
    connected: Arc<AtomicBool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("queue", &self.queue)
            .field("callbacks", &self.callbacks)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(role: &'static str, max_queue: usize, callbacks: Callbacks) -> Self {
        Self {
            role,
            queue: Arc::new(OutboundQueue::new(max_queue)),
            callbacks: Arc::new(callbacks),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub(crate) fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    #[inline]
    pub(crate) fn outbox(&self) -> Outbox {
        Outbox::new(Arc::clone(&self.queue))
    }

    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Serves `socket` until it closes or `running` clears.
    pub(crate) async fn run<S>(&self, socket: WebSocketStream<S>, running: &RunFlag) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let role = self.role;
        let (mut write, mut read) = socket.split();
        let outbox = self.outbox();

        self.connected.store(true, Ordering::SeqCst);
        info!(role, "Session started");

        let end = 'session: loop {
            if !running.is_running() {
                break SessionEnd::Stopped;
            }

            if let Err(e) = self.flush(&mut write).await {
                warn!(role, error = %e, "Send failed");
                break SessionEnd::Failed;
            }

            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(message)) => match classify(message) {
                        Inbound::Payload(payload) => {
                            debug!(role, payload = %payload, "Received");
                            self.callbacks.dispatch(&payload, &outbox);
                        }
                        Inbound::Close => {
                            debug!(role, "Session closed by peer");
                            break 'session SessionEnd::Closed;
                        }
                        Inbound::Ignored => {}
                    },
                    Some(Err(e)) => {
                        warn!(role, error = %e, "WebSocket error");
                        break 'session SessionEnd::Failed;
                    }
                    None => {
                        debug!(role, "WebSocket stream ended");
                        break 'session SessionEnd::Closed;
                    }
                },
                () = self.queue.pushed() => {}
                () = sleep(POLL_INTERVAL) => {}
            }
        };

        self.connected.store(false, Ordering::SeqCst);

        if end == SessionEnd::Stopped
            && let Err(e) = write.close().await
        {
            debug!(role, error = %e, "Close frame not delivered");
        }

        info!(role, ?end, "Session ended");
        end
    }

    /// Sends everything currently queued.
    async fn flush<S>(&self, write: &mut SplitSink<WebSocketStream<S>, Message>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(payload) = self.queue.pop() {
            trace!(role = self.role, payload = %payload, "Sending");
            let sent: Result<()> = match payload.into_message() {
                Ok(message) => write.send(message).await.map_err(Into::into),
                Err(e) => {
                    warn!(role = self.role, error = %e, "Payload not encodable; skipped");
                    Ok(())
                }
            };
            self.queue.task_done();
            sent?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
