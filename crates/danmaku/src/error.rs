//! Danmaku engine error types.
//!
//! Overload, a full queue and unmeasurable text are absorbed by the engine and
//! reported through return values, so they have no variant here.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, DanmakuError>;

/// Errors surfaced by the danmaku engine.
#[derive(Error, Debug)]
pub enum DanmakuError {
    /// A configuration snapshot failed validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A pending `submit` was cancelled by its caller
    #[error("Submission was cancelled")]
    Cancelled,

    /// The ingestion queue was torn down
    #[error("Ingestion queue is closed")]
    QueueClosed,
}

impl DanmakuError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error means the submission never reached the queue
    /// because the caller or the engine gave up on it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::QueueClosed)
    }
}
