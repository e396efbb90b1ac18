//! Risk parameters loaded from external configuration.
//!
//! Loosely-typed configuration is validated into this struct at load
//! time. Out-of-range values are rejected at startup, not at use time.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stop/target derivation model.
///
/// The volatility-unit (ATR) model is canonical; the percentage model
/// is a configuration variant sharing the same sizing formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopModel {
    /// Stop/target offsets scale with the candidate's volatility unit.
    #[default]
    Atr,
    /// Stop/target offsets are fixed fractions of the entry price.
    Percent,
}

/// Risk parameters gating every trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum single-position notional as a fraction of balance.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
    /// Maximum total open exposure as a fraction of balance.
    #[serde(default = "default_max_total_exposure_fraction")]
    pub max_total_exposure_fraction: Decimal,
    /// Capital fraction risked per trade (balance * risk_per_trade is
    /// the loss if the stop is hit).
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: Decimal,
    /// Maximum drawdown from peak equity before the breaker halts.
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: Decimal,
    /// Minimum acceptable candidate volatility.
    #[serde(default = "default_min_volatility")]
    pub min_volatility: Decimal,
    /// Maximum acceptable candidate volatility.
    #[serde(default = "default_max_volatility")]
    pub max_volatility: Decimal,
    /// Minimum liquidity (quote-currency) required to trade.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    /// Maximum pairwise correlation to any open position.
    #[serde(default = "default_max_correlation")]
    pub max_correlation: Decimal,
    /// Maximum trades per UTC day.
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
    /// Minimum seconds between consecutive trades.
    #[serde(default = "default_min_trade_interval_secs")]
    pub min_trade_interval_secs: u64,
    /// Win-rate floor enforced once `win_rate_min_trades` settle.
    #[serde(default = "default_win_rate_floor")]
    pub win_rate_floor: Decimal,
    /// Number of settled trades before the win-rate floor applies.
    #[serde(default = "default_win_rate_min_trades")]
    pub win_rate_min_trades: u32,
    /// Stop/target derivation model.
    #[serde(default)]
    pub stop_model: StopModel,
    /// Stop distance multiplier (k1): `stop = entry - k1 * vol` (ATR
    /// model) or `stop = entry * (1 - k1)` (percent model).
    #[serde(default = "default_stop_multiplier")]
    pub stop_multiplier: Decimal,
    /// Target distance multiplier (k2 > k1 enforces reward:risk > 1).
    #[serde(default = "default_target_multiplier")]
    pub target_multiplier: Decimal,
    /// Slippage tolerance on fills, in basis points.
    #[serde(default = "default_slippage_tolerance_bps")]
    pub slippage_tolerance_bps: Decimal,
}

fn default_max_position_fraction() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_max_total_exposure_fraction() -> Decimal {
    Decimal::new(15, 2) // 0.15
}

fn default_risk_per_trade() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_max_drawdown() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_min_volatility() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_max_volatility() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_min_liquidity() -> Decimal {
    Decimal::from(10_000)
}

fn default_max_correlation() -> Decimal {
    Decimal::new(7, 1) // 0.7
}

fn default_max_trades_per_day() -> u32 {
    20
}

fn default_min_trade_interval_secs() -> u64 {
    300
}

fn default_win_rate_floor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_win_rate_min_trades() -> u32 {
    10
}

fn default_stop_multiplier() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_target_multiplier() -> Decimal {
    Decimal::from(3)
}

fn default_slippage_tolerance_bps() -> Decimal {
    Decimal::from(100)
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_fraction: default_max_position_fraction(),
            max_total_exposure_fraction: default_max_total_exposure_fraction(),
            risk_per_trade: default_risk_per_trade(),
            max_drawdown: default_max_drawdown(),
            min_volatility: default_min_volatility(),
            max_volatility: default_max_volatility(),
            min_liquidity: default_min_liquidity(),
            max_correlation: default_max_correlation(),
            max_trades_per_day: default_max_trades_per_day(),
            min_trade_interval_secs: default_min_trade_interval_secs(),
            win_rate_floor: default_win_rate_floor(),
            win_rate_min_trades: default_win_rate_min_trades(),
            stop_model: StopModel::default(),
            stop_multiplier: default_stop_multiplier(),
            target_multiplier: default_target_multiplier(),
            slippage_tolerance_bps: default_slippage_tolerance_bps(),
        }
    }
}

impl RiskParameters {
    /// Validate ranges. Called at config load and on every parameter
    /// update through the control surface.
    pub fn validate(&self) -> Result<()> {
        let unit = |v: Decimal| v > Decimal::ZERO && v <= Decimal::ONE;

        if !unit(self.max_position_fraction) {
            return Err(CoreError::InvalidParams(format!(
                "max_position_fraction must be in (0, 1], got {}",
                self.max_position_fraction
            )));
        }
        if !unit(self.max_total_exposure_fraction) {
            return Err(CoreError::InvalidParams(format!(
                "max_total_exposure_fraction must be in (0, 1], got {}",
                self.max_total_exposure_fraction
            )));
        }
        if self.max_position_fraction > self.max_total_exposure_fraction {
            return Err(CoreError::InvalidParams(
                "max_position_fraction exceeds max_total_exposure_fraction".to_string(),
            ));
        }
        if !unit(self.risk_per_trade) {
            return Err(CoreError::InvalidParams(format!(
                "risk_per_trade must be in (0, 1], got {}",
                self.risk_per_trade
            )));
        }
        if !unit(self.max_drawdown) {
            return Err(CoreError::InvalidParams(format!(
                "max_drawdown must be in (0, 1], got {}",
                self.max_drawdown
            )));
        }
        if self.min_volatility < Decimal::ZERO || self.max_volatility <= self.min_volatility {
            return Err(CoreError::InvalidParams(format!(
                "volatility band invalid: [{}, {}]",
                self.min_volatility, self.max_volatility
            )));
        }
        if self.min_liquidity < Decimal::ZERO {
            return Err(CoreError::InvalidParams(
                "min_liquidity must be non-negative".to_string(),
            ));
        }
        if self.max_correlation < Decimal::ZERO || self.max_correlation > Decimal::ONE {
            return Err(CoreError::InvalidParams(format!(
                "max_correlation must be in [0, 1], got {}",
                self.max_correlation
            )));
        }
        if self.max_trades_per_day == 0 {
            return Err(CoreError::InvalidParams(
                "max_trades_per_day must be positive".to_string(),
            ));
        }
        if self.win_rate_floor < Decimal::ZERO || self.win_rate_floor > Decimal::ONE {
            return Err(CoreError::InvalidParams(format!(
                "win_rate_floor must be in [0, 1], got {}",
                self.win_rate_floor
            )));
        }
        if self.stop_multiplier <= Decimal::ZERO {
            return Err(CoreError::InvalidParams(
                "stop_multiplier must be positive".to_string(),
            ));
        }
        if self.target_multiplier <= self.stop_multiplier {
            return Err(CoreError::InvalidParams(format!(
                "target_multiplier ({}) must exceed stop_multiplier ({}) for reward:risk > 1",
                self.target_multiplier, self.stop_multiplier
            )));
        }
        if self.stop_model == StopModel::Percent && self.stop_multiplier >= Decimal::ONE {
            return Err(CoreError::InvalidParams(
                "percent stop_multiplier must be below 1".to_string(),
            ));
        }
        if self.slippage_tolerance_bps < Decimal::ZERO {
            return Err(CoreError::InvalidParams(
                "slippage_tolerance_bps must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        RiskParameters::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_inverted_volatility_band() {
        let params = RiskParameters {
            min_volatility: dec!(0.5),
            max_volatility: dec!(0.1),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_reward_risk_below_one() {
        let params = RiskParameters {
            stop_multiplier: dec!(2),
            target_multiplier: dec!(2),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_position_fraction_above_exposure() {
        let params = RiskParameters {
            max_position_fraction: dec!(0.2),
            max_total_exposure_fraction: dec!(0.15),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let params = RiskParameters {
            risk_per_trade: dec!(0),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RiskParameters {
            max_drawdown: dec!(1.5),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_percent_model_multiplier_bound() {
        let params = RiskParameters {
            stop_model: StopModel::Percent,
            stop_multiplier: dec!(1.5),
            target_multiplier: dec!(3),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RiskParameters {
            stop_model: StopModel::Percent,
            stop_multiplier: dec!(0.05),
            target_multiplier: dec!(0.12),
            ..Default::default()
        };
        params.validate().unwrap();
    }
}
