//! Outbound queue with overwrite-oldest backpressure.
//!
//! Producers ([`Outbox::send`], any thread) never block: when a bounded
//! queue is full its oldest item is evicted to make room. The session loop
//! pops items, writes them to the socket and marks each one done;
//! [`OutboundQueue::join`] blocks until every item pushed so far has been
//! either sent or evicted.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::payload::Payload;

// ============================================================================
// OutboundQueue
// ============================================================================

#[derive(Default)]
struct QueueState {
    items: VecDeque<Payload>,
    /// Items pushed but not yet sent or evicted.
    unfinished: usize,
    closed: bool,
}

/// Thread-safe outbound buffer shared between an endpoint and its loop.
pub(crate) struct OutboundQueue {
    /// Maximum queued items; 0 means unbounded.
    capacity: usize,
    state: Mutex<QueueState>,
    /// Signalled when `unfinished` drops to zero.
    drained: Condvar,
    /// Wakes the session loop after a push.
    pushed: Notify,
}

impl fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OutboundQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("unfinished", &state.unfinished)
            .field("closed", &state.closed)
            .finish()
    }
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState::default()),
            drained: Condvar::new(),
            pushed: Notify::new(),
        }
    }

    /// Appends `payload`, evicting the oldest item if the queue is full.
    ///
    /// Returns the evicted item. Pushing to a closed queue drops `payload`.
    pub(crate) fn push(&self, payload: Payload) -> Option<Payload> {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                debug!(kind = payload.kind(), "Dropping payload for closed endpoint");
                return None;
            }

            let evicted = if self.capacity > 0 && state.items.len() >= self.capacity {
                let evicted = state.items.pop_front();
                if evicted.is_some() {
                    state.unfinished -= 1;
                }
                evicted
            } else {
                None
            };

            state.items.push_back(payload);
            state.unfinished += 1;
            evicted
        };

        if let Some(old) = &evicted {
            trace!(evicted = %old, "Outbound queue full; evicted oldest");
        }
        self.pushed.notify_one();
        evicted
    }

    /// Takes the next item to send.
    pub(crate) fn pop(&self) -> Option<Payload> {
        self.state.lock().items.pop_front()
    }

    /// Marks one popped item as sent.
    pub(crate) fn task_done(&self) {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until every pushed item has been sent or evicted.
    pub(crate) fn join(&self) {
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            self.drained.wait(&mut state);
        }
    }

    /// Like [`OutboundQueue::join`], giving up after `timeout`.
    ///
    /// Returns `true` if the queue drained in time. A timeout too large to
    /// add to the current instant waits like `join`.
    pub(crate) fn join_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.join();
            return true;
        };
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            if self.drained.wait_until(&mut state, deadline).timed_out() {
                return state.unfinished == 0;
            }
        }
        true
    }

    /// Rejects further pushes and discards whatever is left.
    ///
    /// Releases every `join` waiter. Returns how many items were discarded.
    pub(crate) fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let discarded = state.items.len();
        state.items.clear();
        state.unfinished = 0;
        self.drained.notify_all();
        discarded
    }

    /// Waits for the next push.
    pub(crate) async fn pushed(&self) {
        self.pushed.notified().await;
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Outbox
// ============================================================================

/// Sending half of an endpoint, handed to callbacks so they can reply.
///
/// Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct Outbox {
    queue: Arc<OutboundQueue>,
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("len", &self.len())
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}

impl Outbox {
    pub(crate) const fn new(queue: Arc<OutboundQueue>) -> Self {
        Self { queue }
    }

    /// Queues `payload` for sending. Never blocks.
    ///
    /// When the queue is full the oldest queued payload is dropped.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.queue.push(payload.into());
    }

    /// Number of payloads waiting to be sent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is waiting to be sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
