//! Operator control surface.
//!
//! A cheaply cloneable handle over the running engine: inspect
//! circuit and endpoint state, halt/resume trading, swap risk
//! parameters at runtime, and drive the lifecycle manager.

use crate::error::EngineResult;
use rust_decimal::Decimal;
use sentinel_core::{
    AccountState, Position, PositionId, PositionStatus, Price, RiskParameters, TokenId,
    TradeCandidate,
};
use sentinel_lifecycle::{AccountLedger, LifecycleError, LifecycleHandle, LifecycleResult};
use sentinel_risk::{CircuitBreaker, CircuitState};
use sentinel_rpc::{Admission, EndpointHealth, RateAdmission, RpcEndpointPool, Scope};
use std::sync::Arc;
use tracing::info;

/// Handle for operating a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) lifecycle: LifecycleHandle,
    pub(crate) ledger: Arc<AccountLedger>,
    pub(crate) pool: Arc<RpcEndpointPool>,
    pub(crate) admission: Arc<RateAdmission>,
    pub(crate) params: Arc<parking_lot::RwLock<RiskParameters>>,
}

impl EngineHandle {
    /// Inbound control calls share a bucket. Halt, resume and close
    /// are exempt: risk-reducing operations are never rate-blocked.
    fn admit_control(&self) -> LifecycleResult<()> {
        match self.admission.admit(&[Scope::Route("control".to_string())]) {
            Admission::Admitted => Ok(()),
            Admission::Rejected { retry_after } => Err(LifecycleError::RateLimited {
                retry_after_ms: retry_after.as_millis() as u64,
            }),
        }
    }

    /// Feed a trade candidate into the lifecycle pipeline.
    pub async fn submit_candidate(
        &self,
        candidate: TradeCandidate,
    ) -> LifecycleResult<PositionId> {
        self.admit_control()?;
        self.lifecycle.submit_candidate(candidate).await
    }

    /// Push a price observation for a token.
    pub async fn price_tick(&self, token: TokenId, price: Price) -> LifecycleResult<()> {
        self.lifecycle.price_tick(token, price).await
    }

    /// Request a manual close of a position.
    pub async fn close_position(&self, id: PositionId) -> LifecycleResult<PositionStatus> {
        self.lifecycle.close_position(id).await
    }

    /// Snapshot of all tracked positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.lifecycle.positions()
    }

    /// Snapshot of the account ledger.
    #[must_use]
    pub fn account(&self) -> AccountState {
        self.ledger.snapshot()
    }

    /// Current circuit breaker state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.snapshot()
    }

    /// Current health of every configured endpoint.
    #[must_use]
    pub fn endpoint_health(&self) -> Vec<EndpointHealth> {
        self.pool.health()
    }

    /// Current peak-to-trough drawdown fraction.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        self.ledger.drawdown()
    }

    /// Halt all new entries until an operator resumes.
    pub fn halt(&self) {
        info!("Operator halt requested");
        self.breaker.halt_manual();
    }

    /// Clear any halt and recovery state.
    pub fn resume(&self) {
        info!("Operator resume requested");
        self.breaker.resume();
    }

    /// Swap in new risk parameters after validation. Both the gate
    /// and the breaker see the update on the next evaluation.
    pub fn update_risk_params(&self, new_params: RiskParameters) -> EngineResult<()> {
        self.admit_control()?;
        new_params.validate()?;
        *self.params.write() = new_params.clone();
        self.breaker.update_params(new_params);
        info!("Risk parameters updated");
        Ok(())
    }
}
