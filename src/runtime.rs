//! Dedicated loop threads.
//!
//! Every bridge instance (HTTP client, WebSocket server, WebSocket client)
//! owns exactly one [`LoopThread`]: an OS thread running a current-thread
//! tokio runtime. Caller threads only ever touch the [`RunFlag`] and the
//! thread-safe queues handed to the loop; the runtime itself never leaves
//! its thread.
//!
//! The runtime is built on the caller thread so that construction errors
//! (and anything the caller wants to set up inside it, like binding a
//! listener) surface synchronously before the thread starts.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// How long loop consumers block on a queue before re-checking the run flag.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Runtime Construction
// ============================================================================

/// Builds the single-threaded runtime a loop thread will drive.
pub(crate) fn build_runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

// ============================================================================
// RunFlag
// ============================================================================

/// Shared "keep running" flag between a loop and its owner.
#[derive(Debug, Clone)]
pub(crate) struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Creates a flag in the running state.
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns `true` until [`RunFlag::stop`] is called.
    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Asks the loop to wind down.
    #[inline]
    pub(crate) fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// LoopThread
// ============================================================================

/// An OS thread hosting one current-thread tokio runtime.
pub(crate) struct LoopThread {
    /// Thread name, used in logs.
    name: String,
    /// Flag observed by the loop body.
    running: RunFlag,
    /// Join handle, taken by the first `stop`.
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Id of the loop thread, to avoid self-joins.
    thread_id: ThreadId,
}

impl fmt::Debug for LoopThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopThread")
            .field("name", &self.name)
            .field("running", &self.running.is_running())
            .finish_non_exhaustive()
    }
}

impl LoopThread {
    /// Starts `main` on a new thread driven by `runtime`.
    ///
    /// `main` receives the [`RunFlag`] and should return once it reads
    /// `false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the thread cannot be spawned.
    pub(crate) fn spawn<F, Fut>(name: &str, runtime: Runtime, main: F) -> Result<Self>
    where
        F: FnOnce(RunFlag) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let running = RunFlag::new();
        let flag = running.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, "Loop thread started");
                runtime.block_on(main(flag));
                // Dropping the runtime here cancels anything still spawned on it.
                drop(runtime);
                debug!(thread = %thread_name, "Loop thread finished");
            })?;

        let thread_id = handle.thread().id();
        info!(thread = name, "Loop started");

        Ok(Self {
            name: name.to_string(),
            running,
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Returns `true` until [`LoopThread::stop`] has been called.
    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Returns `true` once the loop body has returned.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Signals the loop to stop and blocks until the thread has exited.
    ///
    /// Idempotent. When called from the loop thread itself (e.g. inside a
    /// callback) only the flag is cleared.
    pub(crate) fn stop(&self) {
        self.running.stop();

        if thread::current().id() == self.thread_id {
            debug!(thread = %self.name, "Stop requested from loop thread; not joining");
            return;
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(thread = %self.name, "Loop thread panicked");
            }
            info!(thread = %self.name, "Loop closed");
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_stop_joins_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let runtime = build_runtime().expect("runtime");
        let thread = LoopThread::spawn("test-loop", runtime, move |flag| async move {
            while flag.is_running() {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .expect("spawn");

        assert!(thread.is_running());
        thread.stop();
        assert!(!thread.is_running());
        assert!(thread.is_finished());

        let seen = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let runtime = build_runtime().expect("runtime");
        let thread = LoopThread::spawn("test-idempotent", runtime, |flag| async move {
            while flag.is_running() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .expect("spawn");

        thread.stop();
        thread.stop();
        assert!(thread.is_finished());
    }

    #[test]
    fn test_loop_may_finish_on_its_own() {
        let runtime = build_runtime().expect("runtime");
        let thread = LoopThread::spawn("test-short", runtime, |_| async {}).expect("spawn");

        for _ in 0..100 {
            if thread.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(thread.is_finished());
        thread.stop();
    }
}
