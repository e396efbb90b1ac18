//! Composite pre-trade validator.
//!
//! Checks run in a fixed order, cheapest and most restrictive first,
//! short-circuiting on the first failure. Evaluation is pure apart
//! from the rejection metric: a rejected candidate is discarded, never
//! retried.

use rust_decimal::Decimal;
use sentinel_core::{AccountState, RiskParameters, TradeCandidate};
use sentinel_telemetry::Metrics;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::daily::TradeActivity;

// ============================================================================
// RejectReason
// ============================================================================

/// Structured rejection reason, one per gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Circuit breaker is halted.
    CircuitHalted,
    /// Daily trade budget exhausted.
    MaxTradesPerDay,
    /// Too soon after the previous trade.
    TradeIntervalTooShort,
    /// Candidate volatility outside the configured band.
    VolatilityOutOfBand,
    /// Candidate liquidity below the configured minimum.
    InsufficientLiquidity,
    /// Correlation to the open book above the configured maximum.
    CorrelationTooHigh,
    /// Projected exposure would exceed the total exposure cap.
    ExposureCapExceeded,
}

impl RejectReason {
    /// Stable label for metrics and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitHalted => "circuit_halted",
            Self::MaxTradesPerDay => "max_trades_per_day",
            Self::TradeIntervalTooShort => "trade_interval_too_short",
            Self::VolatilityOutOfBand => "volatility_out_of_band",
            Self::InsufficientLiquidity => "insufficient_liquidity",
            Self::CorrelationTooHigh => "correlation_too_high",
            Self::ExposureCapExceeded => "exposure_cap_exceeded",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SizingHint
// ============================================================================

/// Inputs the sizer needs, captured from the same account snapshot the
/// gate evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingHint {
    /// Balance at evaluation time.
    pub balance: Decimal,
    /// Remaining exposure headroom in notional terms.
    pub headroom: Decimal,
    /// Breaker size factor (below 1 during recovery).
    pub size_factor: Decimal,
}

// ============================================================================
// RiskGate
// ============================================================================

/// Ordered pre-trade checks over a consistent account snapshot.
///
/// The snapshot may be stale by the time the sized order reaches the
/// submission boundary; the ledger re-validates exposure atomically at
/// commit time.
pub struct RiskGate {
    breaker: Arc<CircuitBreaker>,
    activity: Arc<TradeActivity>,
}

impl RiskGate {
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, activity: Arc<TradeActivity>) -> Self {
        Self { breaker, activity }
    }

    /// Run all checks against the candidate. Returns a sizing hint on
    /// accept, the first failing check's reason on reject.
    pub fn evaluate(
        &self,
        candidate: &TradeCandidate,
        account: &AccountState,
        params: &RiskParameters,
    ) -> Result<SizingHint, RejectReason> {
        if let Err(reason) = self.run_checks(candidate, account, params) {
            debug!(token = %candidate.token, reason = %reason, "Candidate rejected");
            Metrics::trade_rejected(reason.as_str(), candidate.token.as_str());
            return Err(reason);
        }

        Ok(SizingHint {
            balance: account.balance,
            headroom: account.exposure_headroom(params.max_total_exposure_fraction),
            size_factor: self.breaker.size_factor(),
        })
    }

    /// Validate a sized notional against the exposure cap.
    ///
    /// Used after sizing and again at the commit boundary, where the
    /// ledger calls it under its own lock with the live account state.
    pub fn check_exposure(
        notional: Decimal,
        account: &AccountState,
        params: &RiskParameters,
    ) -> Result<(), RejectReason> {
        let cap = account.balance * params.max_total_exposure_fraction;
        if account.open_exposure + notional > cap {
            return Err(RejectReason::ExposureCapExceeded);
        }
        Ok(())
    }

    fn run_checks(
        &self,
        candidate: &TradeCandidate,
        account: &AccountState,
        params: &RiskParameters,
    ) -> Result<(), RejectReason> {
        // 1. Breaker.
        if self.breaker.is_halted() {
            return Err(RejectReason::CircuitHalted);
        }

        // 2. Trade frequency.
        if self.activity.trades_today() >= params.max_trades_per_day {
            return Err(RejectReason::MaxTradesPerDay);
        }
        if let Some(elapsed) = self.activity.elapsed_since_last_secs() {
            if elapsed < params.min_trade_interval_secs as i64 {
                return Err(RejectReason::TradeIntervalTooShort);
            }
        }

        // 3. Volatility band.
        if candidate.volatility < params.min_volatility
            || candidate.volatility > params.max_volatility
        {
            return Err(RejectReason::VolatilityOutOfBand);
        }

        // 4. Liquidity.
        if candidate.liquidity < params.min_liquidity {
            return Err(RejectReason::InsufficientLiquidity);
        }

        // 5. Correlation.
        if candidate.correlation.abs() > params.max_correlation {
            return Err(RejectReason::CorrelationTooHigh);
        }

        // 6. Exposure headroom. The final notional check happens after
        // sizing; a snapshot with no headroom at all rejects here.
        if account.exposure_headroom(params.max_total_exposure_fraction) <= Decimal::ZERO {
            return Err(RejectReason::ExposureCapExceeded);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use rust_decimal_macros::dec;
    use sentinel_core::{Price, Side, TokenId};

    fn gate() -> RiskGate {
        let breaker = Arc::new(CircuitBreaker::new(
            RiskParameters::default(),
            BreakerConfig::default(),
        ));
        RiskGate::new(breaker, Arc::new(TradeActivity::new()))
    }

    fn candidate() -> TradeCandidate {
        TradeCandidate::new(
            TokenId::new("SOL").unwrap(),
            Side::Buy,
            Price::new(dec!(10)),
            dec!(0.25),
            dec!(50000),
            dec!(0.1),
        )
    }

    #[test]
    fn test_accepts_clean_candidate() {
        let gate = gate();
        let account = AccountState::new(dec!(1000));
        let hint = gate
            .evaluate(&candidate(), &account, &RiskParameters::default())
            .unwrap();

        assert_eq!(hint.balance, dec!(1000));
        assert_eq!(hint.headroom, dec!(150));
        assert_eq!(hint.size_factor, dec!(1));
    }

    #[test]
    fn test_halted_breaker_rejects_first() {
        let breaker = Arc::new(CircuitBreaker::new(
            RiskParameters::default(),
            BreakerConfig::default(),
        ));
        breaker.halt_manual();
        let gate = RiskGate::new(breaker, Arc::new(TradeActivity::new()));

        // Candidate also violates the volatility band; the breaker
        // check fires first.
        let mut bad = candidate();
        bad.volatility = dec!(99);

        let err = gate
            .evaluate(&bad, &AccountState::new(dec!(1000)), &RiskParameters::default())
            .unwrap_err();
        assert_eq!(err, RejectReason::CircuitHalted);
    }

    #[test]
    fn test_volatility_band_rejection() {
        let gate = gate();
        let account = AccountState::new(dec!(1000));
        let params = RiskParameters::default();

        let mut high = candidate();
        high.volatility = dec!(0.9);
        assert_eq!(
            gate.evaluate(&high, &account, &params).unwrap_err(),
            RejectReason::VolatilityOutOfBand
        );

        let mut low = candidate();
        low.volatility = dec!(0);
        assert_eq!(
            gate.evaluate(&low, &account, &params).unwrap_err(),
            RejectReason::VolatilityOutOfBand
        );
    }

    #[test]
    fn test_liquidity_rejection() {
        let gate = gate();
        let mut thin = candidate();
        thin.liquidity = dec!(500);

        let err = gate
            .evaluate(
                &thin,
                &AccountState::new(dec!(1000)),
                &RiskParameters::default(),
            )
            .unwrap_err();
        assert_eq!(err, RejectReason::InsufficientLiquidity);
    }

    #[test]
    fn test_correlation_rejection_is_absolute() {
        let gate = gate();
        let account = AccountState::new(dec!(1000));
        let params = RiskParameters::default();

        let mut pos = candidate();
        pos.correlation = dec!(0.8);
        assert_eq!(
            gate.evaluate(&pos, &account, &params).unwrap_err(),
            RejectReason::CorrelationTooHigh
        );

        let mut neg = candidate();
        neg.correlation = dec!(-0.8);
        assert_eq!(
            gate.evaluate(&neg, &account, &params).unwrap_err(),
            RejectReason::CorrelationTooHigh
        );
    }

    #[test]
    fn test_trade_frequency_rejections() {
        let breaker = Arc::new(CircuitBreaker::new(
            RiskParameters::default(),
            BreakerConfig::default(),
        ));
        let activity = Arc::new(TradeActivity::new());
        let gate = RiskGate::new(breaker, activity.clone());
        let account = AccountState::new(dec!(1000));

        // A trade just now violates the minimum interval.
        activity.record_trade();
        assert_eq!(
            gate.evaluate(&candidate(), &account, &RiskParameters::default())
                .unwrap_err(),
            RejectReason::TradeIntervalTooShort
        );

        // Daily budget check fires before the interval check.
        let params = RiskParameters {
            max_trades_per_day: 1,
            ..Default::default()
        };
        assert_eq!(
            gate.evaluate(&candidate(), &account, &params).unwrap_err(),
            RejectReason::MaxTradesPerDay
        );
    }

    #[test]
    fn test_no_headroom_rejection() {
        let gate = gate();
        let mut account = AccountState::new(dec!(1000));
        account.open_exposure = dec!(150);

        let err = gate
            .evaluate(&candidate(), &account, &RiskParameters::default())
            .unwrap_err();
        assert_eq!(err, RejectReason::ExposureCapExceeded);
    }

    #[test]
    fn test_check_exposure_projected_notional() {
        let mut account = AccountState::new(dec!(1000));
        account.open_exposure = dec!(100);
        let params = RiskParameters::default();

        // Cap is 150; 50 more fits exactly.
        assert!(RiskGate::check_exposure(dec!(50), &account, &params).is_ok());
        assert_eq!(
            RiskGate::check_exposure(dec!(51), &account, &params).unwrap_err(),
            RejectReason::ExposureCapExceeded
        );
    }
}
