//! Account state mutated only by the lifecycle manager.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate account state.
///
/// Single-writer: all mutations go through the lifecycle ledger.
/// Everything else sees read-only snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Free balance in quote currency.
    pub balance: Decimal,
    /// Sum of live position notional.
    pub open_exposure: Decimal,
    /// Realized profit and loss since start.
    pub realized_pnl: Decimal,
    /// Unrealized profit and loss across open positions.
    pub unrealized_pnl: Decimal,
    /// Peak equity high-water mark for drawdown tracking.
    pub peak_equity: Decimal,
}

impl AccountState {
    /// Create a fresh account with the given starting balance.
    #[must_use]
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            open_exposure: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            peak_equity: balance,
        }
    }

    /// Current equity: balance plus unrealized PnL.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.balance + self.unrealized_pnl
    }

    /// Drawdown from peak equity as a fraction in [0, 1].
    ///
    /// Zero when the peak is not yet established.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let dd = (self.peak_equity - self.equity()) / self.peak_equity;
        dd.max(Decimal::ZERO)
    }

    /// Open exposure as a fraction of balance.
    #[must_use]
    pub fn exposure_fraction(&self) -> Decimal {
        if self.balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.open_exposure / self.balance
    }

    /// Headroom left under the exposure cap, in notional terms.
    #[must_use]
    pub fn exposure_headroom(&self, max_total_exposure_fraction: Decimal) -> Decimal {
        (self.balance * max_total_exposure_fraction - self.open_exposure).max(Decimal::ZERO)
    }

    /// Ratchet the peak equity high-water mark.
    pub fn update_peak(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }
}
