//! Error types for sentinel-risk.

use thiserror::Error;

/// Risk subsystem errors.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Sizing failed: {0}")]
    Sizing(#[from] crate::sizer::SizingError),

    #[error("Invalid breaker configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for risk operations.
pub type RiskResult<T> = std::result::Result<T, RiskError>;
