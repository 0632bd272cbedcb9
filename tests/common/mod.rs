//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; later calls are no-ops.
///
/// Set `RUST_LOG=reqbridge=debug` to see loop output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A port that nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Polls `condition` every 10ms until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
