//! Concurrent HTTP client.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ClientBuilder`] and configuration validation |
//! | `config` | [`ClientConfig`], defaults and merge rules |
//! | `core` | [`Client`] and its loop |
//! | `handle` | [`ResponseHandle`] completion bridge |
//! | `pipeline` | Per-request throttle, retry and timeout handling |
//! | `throttle` | [`Throttle`] global + per-host limiter |

// ============================================================================
// Submodules
// ============================================================================

/// Client builder.
pub mod builder;

/// Configuration and defaults.
pub mod config;

/// Client and loop.
pub mod core;

/// Caller-side completion handles.
pub mod handle;

mod pipeline;

/// Concurrency limiter.
pub mod throttle;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use config::{ClientConfig, merge_cookies, merge_headers};
pub use core::Client;
pub use handle::ResponseHandle;
pub use throttle::{Throttle, ThrottleGuard};
