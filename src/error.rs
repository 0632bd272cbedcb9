//! Error types for reqbridge.
//!
//! One error enum covers the whole crate.
//!
//! Network failures of a submitted request are *not* reported through
//! [`enum@Error`]: the pipeline turns them into a failure [`Response`] so a
//! blocking caller never needs error handling to interpret a failed call.
//! [`enum@Error`] covers everything else: malformed submissions, bad
//! configuration, waiting on a cancelled handle and endpoint start-up.
//!
//! [`Response`]: crate::http::Response
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Validation | [`Error::InvalidRequest`], [`Error::InvalidUrl`] |
//! | Execution | [`Error::Timeout`], [`Error::Cancelled`], [`Error::ClientClosed`], [`Error::ThrottleClosed`] |
//! | Connection | [`Error::Connection`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Error returned by every fallible reqbridge operation.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by builders when a setting is out of range or malformed.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the setting.
        message: String,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Request descriptor failed validation.
    ///
    /// Returned before submission, e.g. a GET carrying a body or a request
    /// carrying more than one body variant.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the violation.
        message: String,
    },

    /// Request URL could not be parsed.
    #[error("Invalid URL {url:?}: {message}")]
    InvalidUrl {
        /// The rejected URL text.
        url: String,
        /// Parser message.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Used for exhausted request attempts and for bounded handle waits.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// How long was waited, in milliseconds.
        timeout_ms: u64,
    },

    /// The caller cancelled the handle before the request started.
    #[error("Request cancelled")]
    Cancelled,

    /// The client was closed before the request could run.
    #[error("Client closed")]
    ClientClosed,

    /// A throttle semaphore was closed.
    #[error("Throttle closed")]
    ThrottleClosed,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Underlying cause.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a request validation error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    ///
    /// Transport errors that report a timeout themselves count as well.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::WebSocket(_) => true,
            Self::Http(e) => e.is_connect(),
            _ => false,
        }
    }

    /// Returns `true` if the error was raised while validating a submission.
    #[inline]
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. } | Self::InvalidUrl { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
