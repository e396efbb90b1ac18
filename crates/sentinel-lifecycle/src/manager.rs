//! Order lifecycle orchestration actor.
//!
//! One actor owns every position and all account mutations. Candidate
//! evaluation, sizing and the exposure reservation happen inside the
//! actor, so no two candidates can race past the cap. Network work
//! (submissions, closes) runs in spawned workers that report back via
//! messages; each worker carries a child cancellation token so closing
//! a position or shutting down cancels its in-flight retries.
//!
//! The `positions` map inside the actor is authoritative; a `DashMap`
//! mirror gives the control surface synchronous snapshots without a
//! channel round-trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{
    CloseReason, Position, PositionId, PositionStatus, Price, RiskParameters, Size, TokenId,
    TradeCandidate, TrailingStop,
};
use sentinel_risk::{CircuitBreaker, PositionSizer, RiskGate, TradeActivity};
use sentinel_rpc::{
    Admission, OrderRequest, RateAdmission, RpcEndpointPool, RpcResult, Scope, SubmissionError,
    SubmissionReceipt,
};
use sentinel_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::ledger::AccountLedger;
use crate::supervisor::{slippage_exceeded, supervise_tick};

/// Message queue depth for the actor.
const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// ManagerConfig
// ============================================================================

/// Lifecycle tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Parent deadline over a whole submission retry sequence.
    pub submission_deadline: Duration,
    /// Delay before re-closing a position whose close submission
    /// failed. The retry fires even if the price feed goes quiet.
    pub close_retry_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            submission_deadline: Duration::from_secs(30),
            close_retry_delay: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Messages for the lifecycle actor.
enum ManagerMsg {
    Candidate {
        candidate: TradeCandidate,
        reply: oneshot::Sender<LifecycleResult<PositionId>>,
    },
    SubmissionOutcome {
        id: PositionId,
        outcome: RpcResult<SubmissionReceipt>,
    },
    CloseOutcome {
        id: PositionId,
        reason: CloseReason,
        outcome: RpcResult<SubmissionReceipt>,
    },
    RetryClose {
        id: PositionId,
        reason: CloseReason,
    },
    PriceTick {
        token: TokenId,
        price: Price,
    },
    Close {
        id: PositionId,
        reply: oneshot::Sender<LifecycleResult<PositionStatus>>,
    },
    Shutdown,
}

// ============================================================================
// OrderLifecycleManager
// ============================================================================

/// Shared collaborators the actor drives.
pub struct LifecycleDeps {
    pub breaker: Arc<CircuitBreaker>,
    pub activity: Arc<TradeActivity>,
    pub admission: Arc<RateAdmission>,
    pub pool: Arc<RpcEndpointPool>,
    pub ledger: Arc<AccountLedger>,
    pub params: Arc<parking_lot::RwLock<RiskParameters>>,
}

/// The lifecycle actor. Create with [`OrderLifecycleManager::spawn`].
pub struct OrderLifecycleManager {
    rx: mpsc::Receiver<ManagerMsg>,
    tx: mpsc::Sender<ManagerMsg>,
    gate: RiskGate,
    sizer: PositionSizer,
    deps: LifecycleDeps,
    config: ManagerConfig,
    positions: HashMap<PositionId, Position>,
    mirror: Arc<DashMap<PositionId, Position>>,
    cancels: HashMap<PositionId, CancellationToken>,
    unrealized: HashMap<PositionId, Decimal>,
    last_price: HashMap<TokenId, Price>,
    root_cancel: CancellationToken,
}

impl OrderLifecycleManager {
    /// Spawn the actor and return its handle.
    pub fn spawn(deps: LifecycleDeps, config: ManagerConfig) -> (LifecycleHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mirror = Arc::new(DashMap::new());

        let gate = RiskGate::new(deps.breaker.clone(), deps.activity.clone());
        let task = Self {
            rx,
            tx: tx.clone(),
            gate,
            sizer: PositionSizer::new(),
            deps,
            config,
            positions: HashMap::new(),
            mirror: mirror.clone(),
            cancels: HashMap::new(),
            unrealized: HashMap::new(),
            last_price: HashMap::new(),
            root_cancel: CancellationToken::new(),
        };

        let handle = LifecycleHandle { tx, mirror };
        let join = tokio::spawn(task.run());
        (handle, join)
    }

    async fn run(mut self) {
        info!("Lifecycle manager started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ManagerMsg::Candidate { candidate, reply } => {
                    let result = self.handle_candidate(candidate);
                    let _ = reply.send(result);
                }
                ManagerMsg::SubmissionOutcome { id, outcome } => {
                    self.handle_submission_outcome(id, outcome);
                }
                ManagerMsg::CloseOutcome {
                    id,
                    reason,
                    outcome,
                } => {
                    self.handle_close_outcome(id, reason, outcome);
                }
                ManagerMsg::RetryClose { id, reason } => {
                    self.handle_retry_close(id, reason);
                }
                ManagerMsg::PriceTick { token, price } => {
                    self.handle_price_tick(token, price);
                }
                ManagerMsg::Close { id, reply } => {
                    let result = self.handle_close(id);
                    let _ = reply.send(result);
                }
                ManagerMsg::Shutdown => {
                    info!("Lifecycle manager shutting down");
                    self.root_cancel.cancel();
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Candidate intake
    // ------------------------------------------------------------------

    fn handle_candidate(&mut self, candidate: TradeCandidate) -> LifecycleResult<PositionId> {
        let params = self.deps.params.read().clone();
        let snapshot = self.deps.ledger.snapshot();

        let hint = self
            .gate
            .evaluate(&candidate, &snapshot, &params)
            .map_err(LifecycleError::Rejected)?;

        let sizing = self.sizer.size(
            &candidate,
            &params,
            hint.balance,
            hint.headroom,
            hint.size_factor,
        )?;

        RiskGate::check_exposure(sizing.notional, &snapshot, &params)
            .map_err(LifecycleError::Rejected)?;

        match self
            .deps
            .admission
            .admit(&[Scope::Global, Scope::Route("submit".to_string())])
        {
            Admission::Admitted => {}
            Admission::Rejected { retry_after } => {
                return Err(LifecycleError::RateLimited {
                    retry_after_ms: retry_after.as_millis() as u64,
                });
            }
        }

        let position = Position::pending(
            candidate.token.clone(),
            candidate.side,
            candidate.reference_price,
            Size::new(sizing.quantity),
            sizing.stop,
            sizing.target,
        );

        // Commit-time exposure re-validation, atomic with the reserve.
        self.deps.ledger.reserve(&position, &params)?;

        let id = position.id;
        Metrics::trade_accepted(candidate.token.as_str(), &candidate.side.to_string());
        info!(
            position_id = %id,
            token = %position.token,
            side = %position.side,
            notional = %position.notional,
            stop = %position.stop_price,
            target = %position.target_price,
            "Candidate accepted, submitting"
        );

        let cancel = self.root_cancel.child_token();
        self.spawn_submission(&position, cancel.clone());
        self.cancels.insert(id, cancel);
        self.upsert(position);
        Ok(id)
    }

    fn spawn_submission(&self, position: &Position, cancel: CancellationToken) {
        let request = OrderRequest {
            client_id: position.id,
            token: position.token.clone(),
            side: position.side,
            quantity: position.quantity,
            limit_price: position.entry_price,
        };
        let pool = self.deps.pool.clone();
        let breaker = self.deps.breaker.clone();
        let tx = self.tx.clone();
        let deadline = self.config.submission_deadline;
        let id = position.id;

        tokio::spawn(async move {
            // The submission boundary re-checks the breaker: an
            // evaluation that raced a halt must not reach the wire.
            let outcome = if breaker.is_halted() {
                warn!(position_id = %id, "Breaker halted at submission boundary");
                Err(SubmissionError::Cancelled)
            } else {
                match tokio::time::timeout(deadline, pool.submit(&request, &cancel)).await {
                    Ok(result) => result,
                    Err(_) => Err(SubmissionError::Timeout(deadline.as_millis() as u64)),
                }
            };
            let _ = tx.send(ManagerMsg::SubmissionOutcome { id, outcome }).await;
        });
    }

    fn handle_submission_outcome(&mut self, id: PositionId, outcome: RpcResult<SubmissionReceipt>) {
        let Some(mut position) = self.positions.get(&id).cloned() else {
            warn!(position_id = %id, "Submission outcome for unknown position");
            return;
        };

        match outcome {
            Ok(receipt) => {
                if self.transition(&mut position, PositionStatus::Submitted).is_err()
                    || self.transition(&mut position, PositionStatus::Open).is_err()
                {
                    return;
                }

                let params = self.deps.params.read();
                if slippage_exceeded(
                    position.entry_price,
                    receipt.fill_price,
                    params.slippage_tolerance_bps,
                ) {
                    warn!(
                        position_id = %id,
                        reference = %position.entry_price,
                        fill = %receipt.fill_price,
                        tolerance_bps = %params.slippage_tolerance_bps,
                        "Fill slippage beyond tolerance, closing immediately"
                    );
                    drop(params);
                    position.entry_price = receipt.fill_price;
                    self.upsert(position.clone());
                    self.deps.activity.record_trade();
                    self.initiate_close(id, CloseReason::Manual, receipt.fill_price);
                    return;
                }
                drop(params);

                position.entry_price = receipt.fill_price;
                // The ratchet baseline tracks the actual entry, not
                // the reference price the candidate was sized against.
                position.trailing =
                    TrailingStop::new(position.trailing.distance, receipt.fill_price);
                info!(
                    position_id = %id,
                    endpoint = %receipt.endpoint,
                    order_ref = %receipt.order_ref,
                    fill = %receipt.fill_price,
                    "Position open"
                );
                self.deps.activity.record_trade();
                self.upsert(position);
                Metrics::open_positions(self.open_count());
            }
            Err(e) => {
                warn!(position_id = %id, error = %e, "Submission failed, position failed");
                if self.transition(&mut position, PositionStatus::Failed).is_err() {
                    return;
                }
                // Failed submissions are non-trades: the reservation is
                // released and the breaker's win/loss stats are untouched.
                self.deps.ledger.release(&position);
                self.cancels.remove(&id);
                self.upsert(position);
            }
        }
    }

    // ------------------------------------------------------------------
    // Supervision
    // ------------------------------------------------------------------

    fn handle_price_tick(&mut self, token: TokenId, price: Price) {
        self.last_price.insert(token.clone(), price);

        let ids: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.token == token && p.status == PositionStatus::Open)
            .map(|p| p.id)
            .collect();

        for id in ids {
            let Some(position) = self.positions.get_mut(&id) else {
                continue;
            };
            let outcome = supervise_tick(position, price);
            self.unrealized.insert(id, outcome.unrealized_pnl);
            let snapshot = position.clone();
            self.mirror.insert(id, snapshot);

            if let Some(reason) = outcome.close {
                self.initiate_close(id, reason, price);
            }
        }

        let total: Decimal = self.unrealized.values().copied().sum();
        self.deps.ledger.set_unrealized(total);
        self.deps.breaker.update_drawdown(self.deps.ledger.drawdown());
    }

    fn initiate_close(&mut self, id: PositionId, reason: CloseReason, price: Price) {
        let Some(mut position) = self.positions.get(&id).cloned() else {
            return;
        };
        if self.transition(&mut position, PositionStatus::Closing).is_err() {
            return;
        }
        info!(
            position_id = %id,
            reason = %reason,
            price = %price,
            "Closing position"
        );

        let request = OrderRequest {
            client_id: id,
            token: position.token.clone(),
            side: position.side.opposite(),
            quantity: position.quantity,
            limit_price: price,
        };
        let pool = self.deps.pool.clone();
        let tx = self.tx.clone();
        let cancel = self
            .cancels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.root_cancel.child_token());
        let deadline = self.config.submission_deadline;

        self.upsert(position);
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, pool.submit(&request, &cancel)).await
            {
                Ok(result) => result,
                Err(_) => Err(SubmissionError::Timeout(deadline.as_millis() as u64)),
            };
            let _ = tx
                .send(ManagerMsg::CloseOutcome {
                    id,
                    reason,
                    outcome,
                })
                .await;
        });
    }

    fn handle_close_outcome(
        &mut self,
        id: PositionId,
        reason: CloseReason,
        outcome: RpcResult<SubmissionReceipt>,
    ) {
        let Some(mut position) = self.positions.get(&id).cloned() else {
            warn!(position_id = %id, "Close outcome for unknown position");
            return;
        };

        match outcome {
            Ok(receipt) => {
                if self.transition(&mut position, PositionStatus::Closed).is_err() {
                    return;
                }
                let pnl = position.pnl_at(receipt.fill_price);
                position.realized_pnl = Some(pnl);
                position.close_reason = Some(reason);

                let drawdown = self.deps.ledger.settle(&position, pnl);
                self.deps.breaker.update_drawdown(drawdown);
                self.deps.breaker.record_trade(pnl, pnl > Decimal::ZERO);

                Metrics::position_pnl(
                    position.token.as_str(),
                    &reason.to_string(),
                    pnl.to_f64().unwrap_or(0.0),
                );
                info!(
                    position_id = %id,
                    reason = %reason,
                    pnl = %pnl,
                    fill = %receipt.fill_price,
                    "Position closed"
                );

                self.unrealized.remove(&id);
                self.cancels.remove(&id);
                self.upsert(position);
                Metrics::open_positions(self.open_count());
            }
            Err(e) => {
                // Close failed: the position is still live, go back to
                // Open and schedule a retry. The timer fires even on a
                // quiet feed; a tick that crosses first wins.
                error!(position_id = %id, error = %e, "Close submission failed, retry scheduled");
                let _ = self.transition(&mut position, PositionStatus::Open);
                self.upsert(position);

                let tx = self.tx.clone();
                let cancel = self.root_cancel.clone();
                let delay = self.config.close_retry_delay;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = tx.send(ManagerMsg::RetryClose { id, reason }).await;
                        }
                    }
                });
            }
        }
    }

    fn handle_retry_close(&mut self, id: PositionId, reason: CloseReason) {
        let Some(position) = self.positions.get(&id) else {
            return;
        };
        // A tick may have re-initiated the close, or the position may
        // have reached a terminal state meanwhile.
        if position.status != PositionStatus::Open {
            return;
        }
        let price = self
            .last_price
            .get(&position.token)
            .copied()
            .unwrap_or(position.entry_price);
        info!(position_id = %id, reason = %reason, "Retrying failed close");
        self.initiate_close(id, reason, price);
    }

    // ------------------------------------------------------------------
    // Operator close
    // ------------------------------------------------------------------

    fn handle_close(&mut self, id: PositionId) -> LifecycleResult<PositionStatus> {
        let Some(position) = self.positions.get(&id) else {
            return Err(LifecycleError::UnknownPosition(id));
        };
        let status = position.status;

        match status {
            // Closing a terminal position is a no-op returning the
            // existing terminal state.
            PositionStatus::Closed | PositionStatus::Failed => Ok(status),
            PositionStatus::Closing => Ok(status),
            PositionStatus::Pending | PositionStatus::Submitted => {
                if let Some(cancel) = self.cancels.get(&id) {
                    cancel.cancel();
                }
                info!(position_id = %id, "Cancelling in-flight submission");
                Ok(status)
            }
            PositionStatus::Open => {
                let price = self
                    .last_price
                    .get(&position.token)
                    .copied()
                    .unwrap_or(position.entry_price);
                self.initiate_close(id, CloseReason::Manual, price);
                Ok(PositionStatus::Closing)
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    fn transition(&self, position: &mut Position, to: PositionStatus) -> LifecycleResult<()> {
        let from = position.status;
        if !from.can_transition_to(to) {
            error!(position_id = %position.id, %from, %to, "Illegal position transition");
            return Err(LifecycleError::IllegalTransition {
                id: position.id,
                from,
                to,
            });
        }
        debug!(position_id = %position.id, %from, %to, "Position transition");
        position.status = to;
        Ok(())
    }

    fn upsert(&mut self, position: Position) {
        self.mirror.insert(position.id, position.clone());
        self.positions.insert(position.id, position);
    }

    fn open_count(&self) -> i64 {
        self.positions
            .values()
            .filter(|p| matches!(p.status, PositionStatus::Open | PositionStatus::Closing))
            .count() as i64
    }
}

// ============================================================================
// LifecycleHandle
// ============================================================================

/// Cloneable handle to the lifecycle actor.
#[derive(Clone)]
pub struct LifecycleHandle {
    tx: mpsc::Sender<ManagerMsg>,
    mirror: Arc<DashMap<PositionId, Position>>,
}

impl LifecycleHandle {
    /// Submit a trade candidate through the full gate/size/submit
    /// pipeline. Resolves once the candidate is accepted (position id)
    /// or rejected; the submission itself continues asynchronously.
    pub async fn submit_candidate(
        &self,
        candidate: TradeCandidate,
    ) -> LifecycleResult<PositionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ManagerMsg::Candidate { candidate, reply })
            .await
            .map_err(|_| LifecycleError::ManagerUnavailable)?;
        rx.await.map_err(|_| LifecycleError::ManagerUnavailable)?
    }

    /// Feed a price observation for a token.
    pub async fn price_tick(&self, token: TokenId, price: Price) -> LifecycleResult<()> {
        self.tx
            .send(ManagerMsg::PriceTick { token, price })
            .await
            .map_err(|_| LifecycleError::ManagerUnavailable)
    }

    /// Request a close. Idempotent: terminal positions return their
    /// existing state without a new transition.
    pub async fn close_position(&self, id: PositionId) -> LifecycleResult<PositionStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ManagerMsg::Close { id, reply })
            .await
            .map_err(|_| LifecycleError::ManagerUnavailable)?;
        rx.await.map_err(|_| LifecycleError::ManagerUnavailable)?
    }

    /// Synchronous snapshot of all known positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.mirror.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Synchronous lookup of one position.
    #[must_use]
    pub fn position(&self, id: PositionId) -> Option<Position> {
        self.mirror.get(&id).map(|entry| entry.value().clone())
    }

    /// Stop the actor and cancel all in-flight work.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ManagerMsg::Shutdown).await;
    }
}
