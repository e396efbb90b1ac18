//! Engine configuration.
//!
//! Loaded from a TOML file with `SENTINEL_*` environment overrides.
//! Everything is validated at load time; out-of-range values fail
//! startup rather than surfacing mid-trade.

use crate::error::{EngineError, EngineResult};
use rust_decimal::Decimal;
use sentinel_core::RiskParameters;
use sentinel_risk::BreakerConfig;
use sentinel_rpc::{BucketConfig, PoolConfig};
use serde::{Deserialize, Serialize};

/// One configured RPC endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint URL.
    pub url: String,
    /// Selection weight.
    #[serde(default = "default_endpoint_weight")]
    pub weight: u32,
}

fn default_endpoint_weight() -> u32 {
    10
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Starting account balance in quote currency.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// RPC endpoints, at least one required.
    pub endpoints: Vec<EndpointConfig>,
    /// Risk parameters.
    #[serde(default)]
    pub risk: RiskParameters,
    /// Circuit breaker cooldown/recovery tuning.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Endpoint pool retry/failover tuning.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Rate admission default bucket.
    #[serde(default)]
    pub admission: BucketConfig,
    /// Seconds between endpoint probe rounds.
    #[serde(default = "default_prober_interval_secs")]
    pub prober_interval_secs: u64,
    /// Parent deadline over a whole submission retry sequence.
    #[serde(default = "default_submission_deadline_secs")]
    pub submission_deadline_secs: u64,
}

fn default_initial_balance() -> Decimal {
    Decimal::from(10_000)
}

fn default_prober_interval_secs() -> u64 {
    30
}

fn default_submission_deadline_secs() -> u64 {
    30
}

impl EngineConfig {
    /// Load from a TOML file plus `SENTINEL_*` environment overrides
    /// (e.g. `SENTINEL_RISK__MAX_DRAWDOWN=0.05`).
    pub fn load(path: &str) -> EngineResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to load config: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (testing and embedded defaults).
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(EngineError::Config(
                "initial_balance must be positive".to_string(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(EngineError::Config(
                "at least one RPC endpoint is required".to_string(),
            ));
        }
        if self.prober_interval_secs == 0 || self.submission_deadline_secs == 0 {
            return Err(EngineError::Config(
                "prober_interval_secs and submission_deadline_secs must be positive".to_string(),
            ));
        }
        self.risk.validate()?;
        Ok(())
    }
}
