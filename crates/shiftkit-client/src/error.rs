//! Error types for the backend adapter.

use thiserror::Error;

/// Errors surfaced by [`crate::ShiftApi`] implementations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base url: {0}")]
    BaseUrl(String),
    /// Transport-level failure from the HTTP stack (DNS, TLS, timeout,
    /// non-2xx status).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response arrived but did not decode as the expected shape.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
    /// Backend unreachable, reported by adapters that do not go through
    /// reqwest (in-process fakes, future transports).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
