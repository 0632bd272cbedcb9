//! Global + per-host concurrency limiter.
//!
//! A request may only execute while holding one global permit *and* one
//! permit for its host. Permits are taken global-then-host and given back
//! host-then-global.
//!
//! Per-host semaphores are created on demand and reference counted: a host
//! entry lives while at least one task is waiting on it or holding its
//! permit, and is removed as soon as the last one lets go. Memory therefore
//! tracks the number of *active* hosts, not every host ever seen.
//!
//! ```text
//! acquire(host)
//!   ├─ global.acquire_owned()      (wait)
//!   ├─ hosts[host].refs += 1       (HostLease)
//!   └─ hosts[host].acquire_owned() (wait)
//!
//! ThrottleGuard::release / drop
//!   ├─ drop host permit
//!   ├─ drop HostLease              (refs -= 1, remove entry at 0)
//!   └─ drop global permit
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Per-host semaphore plus the number of tasks referencing it.
struct HostSlot {
    semaphore: Arc<Semaphore>,
    refs: usize,
}

struct ThrottleInner {
    global: Arc<Semaphore>,
    per_host: usize,
    hosts: Mutex<FxHashMap<String, HostSlot>>,
}

// ============================================================================
// Throttle
// ============================================================================

/// Global + per-host concurrency limiter.
///
/// Cheap to clone; clones share permits.
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<ThrottleInner>,
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("available", &self.available())
            .field("per_host", &self.inner.per_host)
            .field("hosts", &self.host_count())
            .finish()
    }
}

impl Throttle {
    /// Creates a throttle allowing `concurrency` requests overall and
    /// `per_host` requests per host.
    #[must_use]
    pub fn new(concurrency: usize, per_host: usize) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                global: Arc::new(Semaphore::new(concurrency)),
                per_host,
                hosts: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Waits until both a global and a `host` permit are available.
    ///
    /// Dropping the returned future at any point gives back whatever was
    /// already acquired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThrottleClosed`] if a semaphore was closed, which
    /// this type never does itself.
    pub async fn acquire(&self, host: &str) -> Result<ThrottleGuard> {
        let global = Arc::clone(&self.inner.global)
            .acquire_owned()
            .await
            .map_err(|_| Error::ThrottleClosed)?;

        let (lease, semaphore) = HostLease::register(&self.inner, host);
        let host_permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::ThrottleClosed)?;

        trace!(host, "Throttle permits acquired");

        Ok(ThrottleGuard {
            host_permit: Some(host_permit),
            lease: Some(lease),
            global_permit: Some(global),
        })
    }

    /// Number of free global permits.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.global.available_permits()
    }

    /// Number of hosts currently referenced by a waiting or running task.
    #[inline]
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.inner.hosts.lock().len()
    }
}

// ============================================================================
// HostLease
// ============================================================================

/// Reference on a host entry; the entry is removed when the last lease drops.
struct HostLease {
    inner: Arc<ThrottleInner>,
    host: String,
}

impl HostLease {
    fn register(inner: &Arc<ThrottleInner>, host: &str) -> (Self, Arc<Semaphore>) {
        let semaphore = {
            let mut hosts = inner.hosts.lock();
            let slot = hosts.entry(host.to_string()).or_insert_with(|| HostSlot {
                semaphore: Arc::new(Semaphore::new(inner.per_host)),
                refs: 0,
            });
            slot.refs += 1;
            Arc::clone(&slot.semaphore)
        };

        let lease = Self {
            inner: Arc::clone(inner),
            host: host.to_string(),
        };
        (lease, semaphore)
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        let mut hosts = self.inner.hosts.lock();
        if let Some(slot) = hosts.get_mut(&self.host) {
            slot.refs -= 1;
            if slot.refs == 0 {
                hosts.remove(&self.host);
                trace!(host = %self.host, "Host entry released");
            }
        }
    }
}

// ============================================================================
// ThrottleGuard
// ============================================================================

/// Proof that a request holds its global and host permits.
///
/// Released by [`ThrottleGuard::release`] or on drop, whichever comes first.
#[must_use = "permits are released as soon as the guard is dropped"]
pub struct ThrottleGuard {
    host_permit: Option<OwnedSemaphorePermit>,
    lease: Option<HostLease>,
    global_permit: Option<OwnedSemaphorePermit>,
}

impl fmt::Debug for ThrottleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleGuard")
            .field("held", &self.is_held())
            .finish()
    }
}

impl ThrottleGuard {
    /// Gives back the host permit, then the global permit. Idempotent.
    pub fn release(&mut self) {
        drop(self.host_permit.take());
        drop(self.lease.take());
        drop(self.global_permit.take());
    }

    /// Returns `true` until the guard has been released.
    #[inline]
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.global_permit.is_some()
    }
}

impl Drop for ThrottleGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Tests
// ============================================================================
