//! Position sizing from risk budget and stop distance.
//!
//! `notional = (balance * risk_per_trade) / stop_distance`, clamped to
//! the per-position cap and the remaining exposure headroom. A wider
//! stop always produces a smaller position for the same risk budget.

use rust_decimal::Decimal;
use sentinel_core::{Price, RiskParameters, Side, StopModel, TradeCandidate};
use thiserror::Error;
use tracing::debug;

/// Sizing failures. All are permanent rejections for the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    #[error("Stop distance is zero or negative for entry {entry}, stop {stop}")]
    InvalidStopDistance { entry: Price, stop: Price },

    #[error("Reference price must be positive, got {0}")]
    InvalidReferencePrice(Price),

    #[error("Account balance must be positive to size a trade")]
    NonPositiveBalance,

    #[error("No exposure headroom left")]
    NoHeadroom,
}

/// A fully derived trade size: notional, quantity and exit levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    /// Position notional in quote currency, after clamping.
    pub notional: Decimal,
    /// Base-asset quantity: notional / entry price.
    pub quantity: Decimal,
    /// Stop-loss level.
    pub stop: Price,
    /// Take-profit level.
    pub target: Price,
    /// Absolute stop distance in price terms.
    pub stop_distance: Decimal,
}

/// Derives stop/target levels and the position size for an accepted
/// candidate. Stateless; reads balance and headroom per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Derive the stop level for a candidate under the configured model.
    #[must_use]
    pub fn stop_level(&self, candidate: &TradeCandidate, params: &RiskParameters) -> Price {
        let entry = candidate.reference_price;
        let offset = match params.stop_model {
            StopModel::Atr => candidate.volatility * params.stop_multiplier,
            StopModel::Percent => entry.inner() * params.stop_multiplier,
        };
        match candidate.side {
            Side::Buy => entry - Price::new(offset),
            Side::Sell => entry + Price::new(offset),
        }
    }

    /// Derive the target level for a candidate under the configured model.
    #[must_use]
    pub fn target_level(&self, candidate: &TradeCandidate, params: &RiskParameters) -> Price {
        let entry = candidate.reference_price;
        let offset = match params.stop_model {
            StopModel::Atr => candidate.volatility * params.target_multiplier,
            StopModel::Percent => entry.inner() * params.target_multiplier,
        };
        match candidate.side {
            Side::Buy => entry + Price::new(offset),
            Side::Sell => entry - Price::new(offset),
        }
    }

    /// Size a candidate given the account balance and the remaining
    /// exposure headroom in notional terms.
    ///
    /// The risk budget (`balance * risk_per_trade * size_factor`) is
    /// the loss taken if the stop is hit. Dividing it by the stop
    /// distance yields the notional, which is clamped to
    /// `balance * max_position_fraction` and to `headroom`, never
    /// scaled up. `size_factor` is 1 in normal operation and below 1
    /// during breaker recovery.
    pub fn size(
        &self,
        candidate: &TradeCandidate,
        params: &RiskParameters,
        balance: Decimal,
        headroom: Decimal,
        size_factor: Decimal,
    ) -> Result<Sizing, SizingError> {
        let entry = candidate.reference_price;
        if !entry.is_positive() {
            return Err(SizingError::InvalidReferencePrice(entry));
        }
        if balance <= Decimal::ZERO {
            return Err(SizingError::NonPositiveBalance);
        }
        if headroom <= Decimal::ZERO {
            return Err(SizingError::NoHeadroom);
        }

        let stop = self.stop_level(candidate, params);
        let stop_distance = match candidate.side {
            Side::Buy => entry.inner() - stop.inner(),
            Side::Sell => stop.inner() - entry.inner(),
        };
        if stop_distance <= Decimal::ZERO {
            return Err(SizingError::InvalidStopDistance { entry, stop });
        }

        let risk_budget = balance * params.risk_per_trade * size_factor;
        let raw_notional = risk_budget / stop_distance;

        let position_cap = balance * params.max_position_fraction;
        let notional = raw_notional.min(position_cap).min(headroom);

        debug!(
            token = %candidate.token,
            raw = %raw_notional,
            clamped = %notional,
            stop = %stop,
            "Sized candidate"
        );

        Ok(Sizing {
            notional,
            quantity: notional / entry.inner(),
            stop,
            target: self.target_level(candidate, params),
            stop_distance,
        })
    }
}
