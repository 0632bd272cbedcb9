//! Blocking-facing HTTP client.
//!
//! A [`Client`] owns one loop thread. Caller threads push work onto an
//! unbounded queue and receive a [`ResponseHandle`]; the loop drains the
//! queue and spawns one pipeline task per request, so many requests are in
//! flight at once while the throttle keeps them within the configured caps.
//!
//! ```text
//! caller ──submit──► [ queue ] ──► loop ──spawn──► pipeline task ─┐
//!    ▲                                                            │
//!    └──────────────── ResponseHandle::wait ◄── Completion ◄──────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use reqbridge::{Client, Request};
//!
//! # fn example() -> reqbridge::Result<()> {
//! let client = Client::builder().concurrency(8).build()?;
//!
//! let handles: Vec<_> = (0..10)
//!     .map(|page| {
//!         client.request(Request::get("https://example.com/").query("page", page.to_string()))
//!     })
//!     .collect::<reqbridge::Result<_>>()?;
//!
//! for handle in handles {
//!     println!("{}", handle.wait()?);
//! }
//! client.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::http::{Request, RequestBuilder, Transport};
use crate::runtime::{LoopThread, POLL_INTERVAL, RunFlag, build_runtime};

use super::builder::ClientBuilder;
use super::config::ClientConfig;
use super::handle::{Completion, ResponseHandle};
use super::pipeline::{self, PipelineContext};
use super::throttle::Throttle;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
struct ClientInner {
    /// Settings fixed at construction.
    config: Arc<ClientConfig>,
    /// Producer end of the work queue.
    sender: UnboundedSender<Completion>,
    /// The loop thread draining the queue.
    thread: LoopThread,
}

// ============================================================================
// Client
// ============================================================================

/// Concurrent HTTP client with a blocking submission API.
///
/// Cheap to clone; clones share the loop. The loop is stopped by
/// [`Client::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a client with default settings.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Queues `request` and returns its handle immediately.
    ///
    /// Safe to call from any thread. After [`Client::close`] the handle is
    /// already resolved with a [`FailureKind::Closed`](crate::FailureKind::Closed)
    /// failure.
    pub fn submit(&self, request: Request) -> ResponseHandle {
        let (completion, handle) = Completion::pair(Arc::new(request));
        debug!(id = %handle.request_id(), request = %completion.request(), "Submitting");

        if let Err(mpsc::error::SendError(completion)) = self.inner.sender.send(completion) {
            warn!(id = %handle.request_id(), "Submit after close");
            completion.close();
        }
        handle
    }

    /// Builds `builder` and submits the resulting request.
    ///
    /// # Errors
    ///
    /// Returns the validation error from [`RequestBuilder::build`]; nothing
    /// is queued in that case.
    pub fn request(&self, builder: RequestBuilder) -> Result<ResponseHandle> {
        Ok(self.submit(builder.build()?))
    }

    /// The client's settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// Queued requests resolve with a `Closed` failure; requests already
    /// running finish first. Idempotent.
    pub fn close(&self) {
        self.inner.thread.stop();
    }

    /// Returns `true` once [`Client::close`] has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.inner.thread.is_running()
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    /// Starts the loop thread.
    pub(crate) fn start(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let config = Arc::new(config);
        let runtime = build_runtime()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let context = Arc::new(PipelineContext {
            config: Arc::clone(&config),
            throttle: Throttle::new(config.concurrency, config.concurrency_per_host),
            transport,
        });

        let thread = LoopThread::spawn("reqbridge-client", runtime, move |running| {
            run_loop(running, receiver, context)
        })?;

        info!(
            concurrency = config.concurrency,
            per_host = config.concurrency_per_host,
            timeout = ?config.timeout,
            retry = config.retry,
            "Client started"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                sender,
                thread,
            }),
        })
    }
}

// ============================================================================
// Loop
// ============================================================================

/// Drains the queue until the run flag clears, then shuts down.
async fn run_loop(
    running: RunFlag,
    mut receiver: UnboundedReceiver<Completion>,
    context: Arc<PipelineContext>,
) {
    let mut tasks = JoinSet::new();

    while running.is_running() {
        match timeout(POLL_INTERVAL, receiver.recv()).await {
            Ok(Some(completion)) => dispatch(&mut tasks, completion, &context),
            Ok(None) => break,
            Err(_) => {}
        }

        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
    }

    shutdown(receiver, tasks).await;
}

/// Spawns the pipeline for one dequeued request unless it was cancelled.
fn dispatch(tasks: &mut JoinSet<()>, mut completion: Completion, context: &Arc<PipelineContext>) {
    if !completion.begin() {
        debug!(id = %completion.request().id(), "Skipping cancelled request");
        return;
    }

    let context = Arc::clone(context);
    tasks.spawn(async move {
        let request = Arc::clone(completion.request());
        let response = pipeline::process(&request, &context).await;
        completion.complete(response);
    });
}

/// Resolves everything still queued and waits for running tasks.
async fn shutdown(mut receiver: UnboundedReceiver<Completion>, mut tasks: JoinSet<()>) {
    receiver.close();

    let mut discarded = 0usize;
    while let Ok(completion) = receiver.try_recv() {
        completion.close();
        discarded += 1;
    }
    if discarded > 0 {
        warn!(discarded, "Queued requests resolved as closed");
    }

    if !tasks.is_empty() {
        debug!(in_flight = tasks.len(), "Waiting for running requests");
    }
    while let Some(result) = tasks.join_next().await {
        log_join(result);
    }
}

fn log_join(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Request task panicked");
        } else {
            debug!(error = %e, "Request task cancelled");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
