//! Per-request pipeline.
//!
//! One spawned task per dequeued request:
//!
//! ```text
//! Pending ──► Throttled ──► Executing(1) ──┬─► Succeeded
//!                              ▲           ├─► Failed      (non-timeout error)
//!                              └─ Retrying ┘   (attempt timed out, k < retry+1)
//!                                          └─► Failed      (all attempts timed out)
//! ```
//!
//! Only timeouts are retried. Whatever happens, the task ends with a
//! [`Response`] and with its throttle permits released.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderValue};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::http::{FailureKind, PreparedRequest, RawResponse, Request, Response, Transport};

use super::config::{ClientConfig, cookie_header};
use super::throttle::Throttle;

// ============================================================================
// PipelineContext
// ============================================================================

/// Everything a pipeline task shares with its siblings.
pub(crate) struct PipelineContext {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) throttle: Throttle,
    pub(crate) transport: Arc<dyn Transport>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs `request` to a terminal [`Response`].
pub(crate) async fn process(request: &Arc<Request>, ctx: &PipelineContext) -> Response {
    let id = request.id();
    debug!(%id, request = %request, "Pending");

    let mut guard = match ctx.throttle.acquire(request.host()).await {
        Ok(guard) => guard,
        Err(e) => {
            error!(%id, error = %e, "Throttle unavailable");
            return Response::failure(request, FailureKind::Transport, &e);
        }
    };

    debug!(%id, "Processing");

    let response = match execute(request, ctx).await {
        Ok(raw) => Response::from_raw(request, raw),
        Err(e) if e.is_timeout() => {
            warn!(%id, request = %request, error = %e, "Request timed out");
            Response::failure(request, FailureKind::Timeout, &e)
        }
        Err(e) => {
            error!(%id, request = %request, error = ?e, "Unexpected transport failure");
            Response::failure(request, FailureKind::Transport, &e)
        }
    };

    guard.release();
    debug!(%id, response = %response, "Done");
    response
}

/// Performs up to `retry + 1` attempts, each bounded by the effective timeout.
async fn execute(request: &Request, ctx: &PipelineContext) -> Result<RawResponse> {
    let prepared = prepare(request, &ctx.config)?;
    let attempt_timeout = ctx.config.effective_timeout(request);
    let attempts = ctx.config.effective_retry(request).saturating_add(1);

    for attempt in 1..=attempts {
        match timeout(attempt_timeout, ctx.transport.execute(&prepared)).await {
            Ok(Err(e)) if e.is_timeout() => {
                debug!(id = %prepared.id, attempt, attempts, error = %e, "Transport timed out");
            }
            Ok(result) => return result,
            Err(_) => {
                debug!(id = %prepared.id, attempt, attempts, "Attempt timed out");
            }
        }
    }

    Err(Error::timeout(
        format!("{} after {attempts} attempts", request.url()),
        millis(attempt_timeout),
    ))
}

/// Applies client defaults to `request`.
pub(crate) fn prepare(request: &Request, config: &ClientConfig) -> Result<PreparedRequest> {
    let mut headers = config.effective_headers(request);

    if let Some(cookies) = cookie_header(&config.effective_cookies(request)) {
        let value = HeaderValue::from_str(&cookies)
            .map_err(|e| Error::invalid_request(format!("invalid cookie header: {e}")))?;
        headers.insert(COOKIE, value);
    }

    Ok(PreparedRequest {
        id: request.id(),
        method: request.method().clone(),
        url: request.url().clone(),
        query: request.query().to_vec(),
        headers,
        body: request.body().cloned(),
    })
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

    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::header::{ACCEPT, HeaderMap};

    use crate::http::FAILURE_STATUS;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Hang,
        Reset,
        TransportTimeout,
        HangThenSucceed(usize),
        Succeed,
    }

    struct Scripted {
        behaviour: Behaviour,
        attempts: AtomicUsize,
        last: Mutex<Option<PreparedRequest>>,
    }

    impl Scripted {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                attempts: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            *self.last.lock() = Some(request.clone());

            let ok = || RawResponse {
                url: request.url.clone(),
                status: 200,
                reason: "OK".into(),
                headers: HeaderMap::new(),
                body: b"done".to_vec(),
            };

            match self.behaviour {
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Reset => Err(Error::connection("connection reset")),
                Behaviour::TransportTimeout => {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out").into())
                }
                Behaviour::HangThenSucceed(hangs) if attempt <= hangs => {
                    std::future::pending().await
                }
                Behaviour::HangThenSucceed(_) | Behaviour::Succeed => Ok(ok()),
            }
        }
    }

    fn context(transport: Arc<Scripted>, retry: u32) -> PipelineContext {
        let config = ClientConfig {
            retry,
            timeout: Duration::from_millis(30),
            ..ClientConfig::default()
        };
        PipelineContext {
            throttle: Throttle::new(config.concurrency, config.concurrency_per_host),
            config: Arc::new(config),
            transport,
        }
    }

    fn get(url: &str) -> Arc<Request> {
        Arc::new(Request::get(url).build().unwrap())
    }

    #[tokio::test]
    async fn test_timeout_exhausts_retry_plus_one_attempts() {
        let transport = Scripted::new(Behaviour::Hang);
        let ctx = context(Arc::clone(&transport), 1);

        let response = process(&get("http://slow.test/"), &ctx).await;

        assert_eq!(transport.attempts(), 2);
        assert_eq!(response.status, FAILURE_STATUS);
        assert_eq!(response.failure, Some(FailureKind::Timeout));
        assert!(response.reason.contains("after 2 attempts"), "{}", response.reason);
        assert_eq!(ctx.throttle.available(), ctx.config.concurrency);
        assert_eq!(ctx.throttle.host_count(), 0);
    }

    #[tokio::test]
    async fn test_non_timeout_error_is_not_retried() {
        let transport = Scripted::new(Behaviour::Reset);
        let ctx = context(Arc::clone(&transport), 3);

        let response = process(&get("http://reset.test/"), &ctx).await;

        assert_eq!(transport.attempts(), 1);
        assert_eq!(response.failure, Some(FailureKind::Transport));
        assert_eq!(response.reason, "Connection failed: connection reset");
        assert!(response.body.is_empty());
        assert_eq!(ctx.throttle.available(), ctx.config.concurrency);
    }

    #[tokio::test]
    async fn test_transport_reported_timeout_is_retried() {
        let transport = Scripted::new(Behaviour::TransportTimeout);
        let ctx = context(Arc::clone(&transport), 2);

        let response = process(&get("http://slow.test/"), &ctx).await;

        assert_eq!(transport.attempts(), 3);
        assert_eq!(response.failure, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_success_after_timed_out_attempt() {
        let transport = Scripted::new(Behaviour::HangThenSucceed(1));
        let ctx = context(Arc::clone(&transport), 1);

        let response = process(&get("http://flaky.test/"), &ctx).await;

        assert_eq!(transport.attempts(), 2);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"done");
        assert!(!response.is_failure());
    }

    #[tokio::test]
    async fn test_request_retry_override() {
        let transport = Scripted::new(Behaviour::Hang);
        let ctx = context(Arc::clone(&transport), 5);
        let request = Arc::new(
            Request::get("http://slow.test/")
                .retry(0)
                .timeout(Duration::from_millis(10))
                .build()
                .unwrap(),
        );

        let response = process(&request, &ctx).await;

        assert_eq!(transport.attempts(), 1);
        assert!(response.reason.contains("Timeout after 10ms"), "{}", response.reason);
    }

    #[tokio::test]
    async fn test_prepared_request_merges_defaults() {
        let transport = Scripted::new(Behaviour::Succeed);
        let mut ctx = context(Arc::clone(&transport), 0);
        let mut config = (*ctx.config).clone();
        config.cookies.insert("ck".into(), "cv".into());
        ctx.config = Arc::new(config);

        let request = Arc::new(
            Request::post("http://a.test/")
                .header("Accept", "text/html")
                .cookie("a", "b")
                .query("page", "2")
                .text("hi")
                .build()
                .unwrap(),
        );
        let _ = process(&request, &ctx).await;

        let prepared = transport.last.lock().clone().expect("one attempt");
        assert_eq!(prepared.headers[ACCEPT], "text/html");
        assert_eq!(prepared.headers[COOKIE], "a=b; ck=cv");
        assert_eq!(prepared.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(prepared.body.as_ref().map(|b| b.kind()), Some("text"));
    }

    #[tokio::test]
    async fn test_metadata_echoed_on_failure() {
        let transport = Scripted::new(Behaviour::Reset);
        let ctx = context(transport, 0);
        let request = Arc::new(
            Request::get("http://a.test/")
                .meta("page", serde_json::json!(7))
                .build()
                .unwrap(),
        );

        let response = process(&request, &ctx).await;

        assert_eq!(response.meta.get("page"), Some(&serde_json::json!(7)));
        assert_eq!(response.request.id(), request.id());
    }
}
