//! HTTP data types and the transport seam.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `request` | [`Request`] descriptors and their validation |
//! | `response` | [`Response`] and failure classification |
//! | `transport` | [`Transport`] trait and the reqwest implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Request descriptors.
pub mod request;

/// Responses and failure responses.
pub mod response;

/// Transport trait and default implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use request::{Body, Meta, Request, RequestBuilder, RequestId};
pub use response::{FAILURE_STATUS, FailureKind, Response};
pub use reqwest::Method;
pub use reqwest::header::HeaderMap;
pub use transport::{
    FILE_CHUNK_SIZE, PreparedRequest, RawResponse, ReqwestTransport, Transport, file_chunks,
};
