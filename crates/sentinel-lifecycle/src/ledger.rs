//! Single-writer account ledger.
//!
//! All balance and exposure mutations go through this type under one
//! lock. The risk gate evaluates against snapshots; the exposure cap
//! is re-validated here, atomically, when a position reserves notional
//! at the submission boundary (optimistic check-then-commit).

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{AccountState, Position, RiskParameters};
use sentinel_telemetry::Metrics;
use tracing::{error, info};

use crate::error::{LifecycleError, LifecycleResult};

/// Account ledger guarding the exposure invariant.
pub struct AccountLedger {
    state: Mutex<AccountState>,
}

impl AccountLedger {
    #[must_use]
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            state: Mutex::new(AccountState::new(initial_balance)),
        }
    }

    /// Consistent read-only snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AccountState {
        self.state.lock().clone()
    }

    /// Reserve a position's notional against the exposure cap.
    ///
    /// The check and the commit happen under one lock, so an accepted
    /// gate evaluation that went stale cannot push exposure over the
    /// cap. Violations are logged at the highest severity and the
    /// reservation is refused.
    pub fn reserve(&self, position: &Position, params: &RiskParameters) -> LifecycleResult<()> {
        let mut state = self.state.lock();
        let cap = state.balance * params.max_total_exposure_fraction;
        if state.open_exposure + position.notional > cap {
            error!(
                position_id = %position.id,
                notional = %position.notional,
                open_exposure = %state.open_exposure,
                cap = %cap,
                "Exposure cap would be violated at commit time"
            );
            return Err(LifecycleError::InvariantViolation(format!(
                "exposure {} + {} exceeds cap {}",
                state.open_exposure, position.notional, cap
            )));
        }
        state.open_exposure += position.notional;
        Metrics::exposure_fraction(state.exposure_fraction().to_f64().unwrap_or(0.0));
        Ok(())
    }

    /// Release a reservation for a position that never opened.
    pub fn release(&self, position: &Position) {
        let mut state = self.state.lock();
        state.open_exposure = (state.open_exposure - position.notional).max(Decimal::ZERO);
        Metrics::exposure_fraction(state.exposure_fraction().to_f64().unwrap_or(0.0));
    }

    /// Settle a closed position: realize PnL, drop its exposure and
    /// ratchet the equity peak. Returns the resulting drawdown.
    pub fn settle(&self, position: &Position, pnl: Decimal) -> Decimal {
        let mut state = self.state.lock();
        state.open_exposure = (state.open_exposure - position.notional).max(Decimal::ZERO);
        state.balance += pnl;
        state.realized_pnl += pnl;
        state.update_peak();
        let drawdown = state.drawdown();

        info!(
            position_id = %position.id,
            pnl = %pnl,
            balance = %state.balance,
            drawdown = %drawdown,
            "Position settled"
        );
        Metrics::exposure_fraction(state.exposure_fraction().to_f64().unwrap_or(0.0));
        drawdown
    }

    /// Replace the aggregate unrealized PnL estimate.
    pub fn set_unrealized(&self, pnl: Decimal) {
        let mut state = self.state.lock();
        state.unrealized_pnl = pnl;
        state.update_peak();
    }

    /// Current drawdown fraction.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        self.state.lock().drawdown()
    }
}
