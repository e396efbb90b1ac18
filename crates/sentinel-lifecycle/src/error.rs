//! Error types for sentinel-lifecycle.

use sentinel_core::{PositionId, PositionStatus};
use sentinel_risk::{RejectReason, SizingError};
use sentinel_rpc::SubmissionError;
use thiserror::Error;

/// Lifecycle orchestration errors.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// Risk gate rejection; the candidate is discarded.
    #[error("Candidate rejected: {0}")]
    Rejected(RejectReason),

    /// Sizing failure; the candidate is discarded.
    #[error("Sizing failed: {0}")]
    Sizing(#[from] SizingError),

    /// Rate admission rejected the submission.
    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Submission error after retries.
    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    /// Exposure or drawdown check failed at commit time.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Attempted an illegal position state transition.
    #[error("Illegal transition {from} -> {to} for position {id}")]
    IllegalTransition {
        id: PositionId,
        from: PositionStatus,
        to: PositionStatus,
    },

    /// Position id not known to the manager.
    #[error("Unknown position {0}")]
    UnknownPosition(PositionId),

    /// The manager task is gone.
    #[error("Lifecycle manager unavailable")]
    ManagerUnavailable,
}

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
