//! Completion handles.
//!
//! Every submission creates one shared slot with two ends:
//!
//! - [`ResponseHandle`] stays with the caller. It can be waited on from any
//!   thread, any number of times, and cancelled while still pending.
//! - [`Completion`] travels with the work item into the loop. It moves the
//!   slot to *running* when the item is dequeued and resolves it with the
//!   pipeline's [`Response`].
//!
//! Resolution happens exactly once. A `Completion` dropped without resolving
//! (aborted task, panic, shutdown) resolves the slot with a
//! [`FailureKind::Closed`] failure, so a caller never waits on a handle that
//! can no longer complete.
//!
//! ```text
//!          cancel()                 begin()              complete()
//! Pending ─────────► Cancelled   Pending ───► Running ───────────────► Finished
//!    └───────────────────────── complete()/drop ────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::http::{FailureKind, Request, RequestId, Response};

// ============================================================================
// Types
// ============================================================================

/// Lifecycle of one submission.
#[derive(Debug)]
enum State {
    /// Queued, not yet dequeued by the loop.
    Pending,
    /// Dequeued and handed to the pipeline.
    Running,
    /// Cancelled by the caller before it started.
    Cancelled,
    /// Resolved.
    Finished(Response),
}

struct Slot {
    state: Mutex<State>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending),
            ready: Condvar::new(),
        })
    }

    /// Stores `response` unless the slot was cancelled or already resolved.
    fn resolve(&self, id: RequestId, response: Response) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Pending | State::Running => {
                *state = State::Finished(response);
                self.ready.notify_all();
                true
            }
            State::Cancelled => {
                debug!(%id, "Dropping response for cancelled request");
                false
            }
            State::Finished(_) => {
                warn!(%id, "Request resolved twice; keeping first response");
                false
            }
        }
    }
}

/// Outcome of a slot that no longer needs waiting on.
fn settled(state: &State) -> Option<Result<Response>> {
    match state {
        State::Finished(response) => Some(Ok(response.clone())),
        State::Cancelled => Some(Err(Error::Cancelled)),
        State::Pending | State::Running => None,
    }
}

// ============================================================================
// ResponseHandle
// ============================================================================

/// Caller-side handle resolving to the request's [`Response`].
///
/// # Example
///
/// ```no_run
/// use reqbridge::{Client, Request};
///
/// # fn example() -> reqbridge::Result<()> {
/// let client = Client::new()?;
/// let handle = client.submit(Request::get("https://example.com/").build()?);
/// let response = handle.wait()?;
/// println!("{} {}", response.status, response.reason);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseHandle {
    slot: Arc<Slot>,
    id: RequestId,
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ResponseHandle {
    /// ID of the submitted request.
    #[inline]
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.id
    }

    /// Blocks until the response is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the handle was cancelled.
    pub fn wait(&self) -> Result<Response> {
        let mut state = self.slot.state.lock();
        loop {
            if let Some(outcome) = settled(&state) {
                return outcome;
            }
            self.slot.ready.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout` waiting for the response.
    ///
    /// A timeout too large to add to the current instant waits like
    /// [`ResponseHandle::wait`].
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the handle was cancelled
    /// - [`Error::Timeout`] if the response is not ready in time
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Response> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        let mut state = self.slot.state.lock();
        loop {
            if let Some(outcome) = settled(&state) {
                return outcome;
            }
            if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                return settled(&state).unwrap_or_else(|| {
                    Err(Error::timeout(
                        format!("waiting for request {}", self.id),
                        u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    ))
                });
            }
        }
    }

    /// Returns the response if it is already available.
    #[must_use]
    pub fn try_response(&self) -> Option<Response> {
        match &*self.slot.state.lock() {
            State::Finished(response) => Some(response.clone()),
            _ => None,
        }
    }

    /// Cancels the request if the loop has not started it yet.
    ///
    /// Returns `true` if the request will not run. Once started a request
    /// runs to completion and cancelling has no effect.
    pub fn cancel(&self) -> bool {
        let mut state = self.slot.state.lock();
        match *state {
            State::Pending => {
                *state = State::Cancelled;
                self.slot.ready.notify_all();
                true
            }
            State::Cancelled => true,
            State::Running | State::Finished(_) => false,
        }
    }

    /// Returns `true` once a response is available.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(*self.slot.state.lock(), State::Finished(_))
    }

    /// Returns `true` if the handle was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot.state.lock(), State::Cancelled)
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Loop-side end of a submission slot.
pub(crate) struct Completion {
    slot: Arc<Slot>,
    request: Arc<Request>,
    resolved: bool,
}

impl Completion {
    /// Creates a connected `(Completion, ResponseHandle)` pair.
    pub(crate) fn pair(request: Arc<Request>) -> (Self, ResponseHandle) {
        let slot = Slot::new();
        let handle = ResponseHandle {
            slot: Arc::clone(&slot),
            id: request.id(),
        };
        let completion = Self {
            slot,
            request,
            resolved: false,
        };
        (completion, handle)
    }

    /// The request this completion belongs to.
    #[inline]
    pub(crate) const fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// Marks the request as running.
    ///
    /// Returns `false` if the caller cancelled first; the request must then
    /// not be executed.
    pub(crate) fn begin(&mut self) -> bool {
        let mut state = self.slot.state.lock();
        match *state {
            State::Pending => {
                *state = State::Running;
                true
            }
            State::Cancelled => {
                self.resolved = true;
                false
            }
            State::Running | State::Finished(_) => false,
        }
    }

    /// Resolves the caller's handle with `response`.
    pub(crate) fn complete(mut self, response: Response) {
        self.resolved = true;
        self.slot.resolve(self.request.id(), response);
    }

    /// Resolves the caller's handle with a [`FailureKind::Closed`] failure.
    pub(crate) fn close(mut self) {
        self.resolve_closed();
    }

    fn resolve_closed(&mut self) {
        self.resolved = true;
        let response = Response::failure(&self.request, FailureKind::Closed, &Error::ClientClosed);
        self.slot.resolve(self.request.id(), response);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(id = %self.request.id(), "Completion dropped unresolved");
            self.resolve_closed();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
