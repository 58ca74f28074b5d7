//! Error taxonomy for the runtime layer.

use thiserror::Error;

use shiftkit_client::ApiError;
use shiftkit_core::types::WorkerStatus;

/// Failures from the background location engine bridge.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine command failed: {0}")]
    Command(String),
}

/// Failures from the durable key-value cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Photo capture seam failure. Aborts whichever punch flow needed it.
#[derive(Debug, Error)]
#[error("photo capture failed: {0}")]
pub struct CaptureError(pub String);

/// Session-level failures surfaced to the UI.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Punching before a user id is known is an integration bug in the
    /// host, not a retryable condition.
    #[error("user id is not set")]
    MissingUserId,
    #[error("backend rejected punch: {0}")]
    Rejected(String),
    #[error("a shift is already active")]
    AlreadyOnShift,
    #[error("worker is not eligible to punch in: {0}")]
    NotEligible(WorkerStatus),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
