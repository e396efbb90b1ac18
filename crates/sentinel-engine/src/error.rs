//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] sentinel_core::CoreError),

    #[error("Risk error: {0}")]
    Risk(#[from] sentinel_risk::RiskError),

    #[error("RPC error: {0}")]
    Rpc(#[from] sentinel_rpc::SubmissionError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] sentinel_lifecycle::LifecycleError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sentinel_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
