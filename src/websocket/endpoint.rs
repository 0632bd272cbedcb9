//! Caller-facing half shared by [`WebSocketServer`](super::WebSocketServer)
//! and [`WebSocketClient`](super::WebSocketClient).

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::runtime::LoopThread;

use super::payload::Payload;
use super::queue::Outbox;
use super::session::Session;

/// An endpoint's session state plus the loop thread driving it.
pub(crate) struct Endpoint {
    session: Session,
    thread: LoopThread,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("session", &self.session)
            .field("thread", &self.thread)
            .finish()
    }
}

impl Endpoint {
    pub(crate) const fn new(session: Session, thread: LoopThread) -> Self {
        Self { session, thread }
    }

    pub(crate) fn send(&self, payload: Payload) {
        self.session.queue().push(payload);
    }

    pub(crate) fn join(&self) {
        self.session.queue().join();
    }

    pub(crate) fn join_timeout(&self, timeout: Duration) -> bool {
        self.session.queue().join_timeout(timeout)
    }

    pub(crate) fn outbox(&self) -> Outbox {
        self.session.outbox()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Stopped by the owner, or the loop returned on its own.
    pub(crate) fn is_closed(&self) -> bool {
        !self.thread.is_running() || self.thread.is_finished()
    }

    pub(crate) fn close(&self) {
        self.thread.stop();
        let discarded = self.session.queue().close();
        if discarded > 0 {
            debug!(discarded, "Unsent payloads discarded on close");
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}
