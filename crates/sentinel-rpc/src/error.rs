//! Error types for sentinel-rpc.

use thiserror::Error;

/// Submission failures, split by retry semantics.
///
/// Transient errors are retried with backoff against the
/// next-healthiest endpoint; permanent errors abort the submission.
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    #[error("Transient submission failure: {0}")]
    Transient(String),

    #[error("Permanent submission failure: {0}")]
    Permanent(String),

    #[error("Submission timed out after {0} ms")]
    Timeout(u64),

    #[error("Endpoint rate limited")]
    RateLimited,

    #[error("All endpoints blacklisted or exhausted")]
    EndpointExhausted,

    #[error("Submission cancelled")]
    Cancelled,
}

impl SubmissionError {
    /// Whether a retry against another endpoint may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Timeout(_) | Self::RateLimited
        )
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = std::result::Result<T, SubmissionError>;
