//! Circuit breaker: halts all new entries on drawdown or a sustained
//! losing streak.
//!
//! Once halted, the breaker stays halted for the configured cooldown,
//! and past that until drawdown is back under the limit. Automatic
//! halts then pass through a recovery phase at reduced size before
//! restoring full capacity; the win-rate sample restarts with the
//! recovery phase. Manual halts never auto-resume.
//!
//! Thread-safe: share via `Arc<CircuitBreaker>`. The halted flag is an
//! atomic so the submission hot path never takes the lock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::RiskParameters;
use sentinel_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

// ============================================================================
// HaltReason
// ============================================================================

/// Why the breaker halted trading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Drawdown from peak equity crossed `max_drawdown`.
    DrawdownExceeded,
    /// Win rate fell below the floor with enough settled trades.
    WinRateBelowFloor,
    /// Operator-initiated halt.
    Manual,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DrawdownExceeded => write!(f, "drawdown_exceeded"),
            Self::WinRateBelowFloor => write!(f, "win_rate_below_floor"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ============================================================================
// BreakerConfig
// ============================================================================

/// Cooldown and recovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Minimum halted time before an automatic halt can resume.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Settled trades required at reduced size before full capacity.
    #[serde(default = "default_recovery_trades")]
    pub recovery_trades: u32,
    /// Size factor applied while recovering.
    #[serde(default = "default_recovery_size_factor")]
    pub recovery_size_factor: Decimal,
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_recovery_trades() -> u32 {
    5
}

fn default_recovery_size_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            recovery_trades: default_recovery_trades(),
            recovery_size_factor: default_recovery_size_factor(),
        }
    }
}

// ============================================================================
// CircuitState
// ============================================================================

/// Snapshot of the breaker for the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    /// Whether new entries are blocked.
    pub halted: bool,
    /// Reason for the current halt, if any.
    pub reason: Option<HaltReason>,
    /// When the current halt began.
    pub halted_at: Option<DateTime<Utc>>,
    /// Earliest auto-resume time (absent for manual halts).
    pub resume_at: Option<DateTime<Utc>>,
    /// Settled trades still required at reduced size, zero if not
    /// recovering.
    pub recovery_trades_left: u32,
    /// Settled trades in the current evaluation window. The window
    /// restarts when the breaker resumes.
    pub trades_settled: u32,
    /// Winning trades in the current evaluation window.
    pub trades_won: u32,
    /// Last observed drawdown fraction.
    pub drawdown: Decimal,
}

#[derive(Debug)]
struct BreakerInner {
    reason: Option<HaltReason>,
    halted_at: Option<DateTime<Utc>>,
    resume_at: Option<DateTime<Utc>>,
    recovery_trades_left: u32,
    trades_settled: u32,
    trades_won: u32,
    drawdown: Decimal,
}

// ============================================================================
// CircuitBreaker
// ============================================================================

/// Drawdown and win-rate circuit breaker.
pub struct CircuitBreaker {
    params: RwLock<RiskParameters>,
    config: BreakerConfig,
    inner: RwLock<BreakerInner>,
    /// Fast-path halted flag.
    halted: AtomicBool,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(params: RiskParameters, config: BreakerConfig) -> Self {
        Self {
            params: RwLock::new(params),
            config,
            inner: RwLock::new(BreakerInner {
                reason: None,
                halted_at: None,
                resume_at: None,
                recovery_trades_left: 0,
                trades_settled: 0,
                trades_won: 0,
                drawdown: Decimal::ZERO,
            }),
            halted: AtomicBool::new(false),
        }
    }

    /// Whether new entries are blocked right now (fast path).
    ///
    /// Also rolls an expired automatic cooldown into recovery once the
    /// re-evaluation passes, so the first check after both conditions
    /// hold unblocks trading.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        if !self.halted.load(Ordering::SeqCst) {
            return false;
        }
        self.try_auto_resume();
        self.halted.load(Ordering::SeqCst)
    }

    /// Size factor for new entries: 1 in normal operation, reduced
    /// while recovering from an automatic halt.
    #[must_use]
    pub fn size_factor(&self) -> Decimal {
        let inner = self.inner.read();
        if inner.recovery_trades_left > 0 {
            self.config.recovery_size_factor
        } else {
            Decimal::ONE
        }
    }

    /// Record a settled trade and re-evaluate the win-rate floor.
    ///
    /// The floor only applies once `win_rate_min_trades` trades have
    /// settled. Trades that failed before submission are not settled
    /// trades and must not be recorded here.
    pub fn record_trade(&self, pnl: Decimal, is_win: bool) {
        let mut inner = self.inner.write();
        inner.trades_settled += 1;
        if is_win {
            inner.trades_won += 1;
        }
        if inner.recovery_trades_left > 0 {
            inner.recovery_trades_left -= 1;
            if inner.recovery_trades_left == 0 {
                info!("Recovery complete, full size restored");
            }
        }

        let params = self.params.read();
        if inner.trades_settled >= params.win_rate_min_trades {
            let win_rate =
                Decimal::from(inner.trades_won) / Decimal::from(inner.trades_settled);
            if win_rate < params.win_rate_floor {
                warn!(
                    win_rate = %win_rate,
                    floor = %params.win_rate_floor,
                    settled = inner.trades_settled,
                    pnl = %pnl,
                    "Win rate below floor"
                );
                drop(params);
                self.halt_locked(&mut inner, HaltReason::WinRateBelowFloor);
            }
        }
    }

    /// Feed the latest drawdown fraction, halting if it crosses
    /// `max_drawdown`.
    pub fn update_drawdown(&self, drawdown: Decimal) {
        let mut inner = self.inner.write();
        inner.drawdown = drawdown;
        Metrics::drawdown(drawdown.to_f64().unwrap_or(0.0));

        let max_drawdown = self.params.read().max_drawdown;
        if drawdown >= max_drawdown && !self.halted.load(Ordering::SeqCst) {
            warn!(drawdown = %drawdown, max = %max_drawdown, "Drawdown threshold crossed");
            self.halt_locked(&mut inner, HaltReason::DrawdownExceeded);
        }
    }

    /// Operator halt. No cooldown; only [`CircuitBreaker::resume`]
    /// clears it. If already halted the original reason is kept.
    pub fn halt_manual(&self) {
        let mut inner = self.inner.write();
        self.halt_locked(&mut inner, HaltReason::Manual);
    }

    /// Operator resume. Clears any halt, including manual ones, and
    /// skips the recovery phase. The win-rate window restarts so the
    /// pre-halt record cannot re-trip the floor on the next settle.
    pub fn resume(&self) {
        let mut inner = self.inner.write();
        if inner.reason.is_some() {
            info!(previous_reason = ?inner.reason, "Breaker manually resumed");
        }
        inner.reason = None;
        inner.halted_at = None;
        inner.resume_at = None;
        inner.recovery_trades_left = 0;
        inner.trades_settled = 0;
        inner.trades_won = 0;
        self.halted.store(false, Ordering::SeqCst);
        Metrics::circuit_halted(false);
    }

    /// Replace the risk parameters (validated by the caller).
    pub fn update_params(&self, params: RiskParameters) {
        *self.params.write() = params;
        info!("Breaker risk parameters updated");
    }

    /// Current snapshot for the control surface.
    #[must_use]
    pub fn snapshot(&self) -> CircuitState {
        let inner = self.inner.read();
        CircuitState {
            halted: self.halted.load(Ordering::SeqCst),
            reason: inner.reason.clone(),
            halted_at: inner.halted_at,
            resume_at: inner.resume_at,
            recovery_trades_left: inner.recovery_trades_left,
            trades_settled: inner.trades_settled,
            trades_won: inner.trades_won,
            drawdown: inner.drawdown,
        }
    }

    // First halt wins: a later trigger never overwrites the reason.
    fn halt_locked(&self, inner: &mut BreakerInner, reason: HaltReason) {
        if self
            .halted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(new_reason = %reason, "Breaker already halted, keeping original reason");
            return;
        }

        let now = Utc::now();
        inner.halted_at = Some(now);
        inner.resume_at = match reason {
            HaltReason::Manual => None,
            _ => Some(now + Duration::seconds(self.config.cooldown_secs as i64)),
        };
        error!(reason = %reason, resume_at = ?inner.resume_at, "CIRCUIT BREAKER HALTED");
        Metrics::circuit_halt(&reason.to_string());
        Metrics::circuit_halted(true);
        inner.reason = Some(reason);
    }

    fn try_auto_resume(&self) {
        let mut inner = self.inner.write();
        let Some(resume_at) = inner.resume_at else {
            return;
        };
        if Utc::now() < resume_at {
            return;
        }

        // Cooldown alone is not enough: resuming also requires the
        // re-evaluation to pass. Drawdown still past the limit keeps
        // the halt in place; the check repeats on later calls.
        let max_drawdown = self.params.read().max_drawdown;
        if inner.drawdown >= max_drawdown {
            debug!(
                drawdown = %inner.drawdown,
                max = %max_drawdown,
                "Cooldown elapsed but drawdown still excessive, staying halted"
            );
            return;
        }

        info!(
            previous_reason = ?inner.reason,
            recovery_trades = self.config.recovery_trades,
            size_factor = %self.config.recovery_size_factor,
            "Cooldown elapsed and drawdown recovered, resuming at reduced size"
        );
        inner.reason = None;
        inner.halted_at = None;
        inner.resume_at = None;
        inner.recovery_trades_left = self.config.recovery_trades;
        // The win rate is re-proven over the recovery schedule, so the
        // sample that tripped the floor is discarded here.
        inner.trades_settled = 0;
        inner.trades_won = 0;
        self.halted.store(false, Ordering::SeqCst);
        Metrics::circuit_halted(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(RiskParameters::default(), BreakerConfig::default())
    }

    #[test]
    fn test_initially_not_halted() {
        let breaker = breaker();
        assert!(!breaker.is_halted());
        assert_eq!(breaker.size_factor(), dec!(1));
        assert!(breaker.snapshot().reason.is_none());
    }

    #[test]
    fn test_drawdown_halt_at_threshold() {
        let breaker = breaker();

        breaker.update_drawdown(dec!(0.09));
        assert!(!breaker.is_halted());

        // Default max_drawdown is 0.10; crossing halts.
        breaker.update_drawdown(dec!(0.10));
        assert!(breaker.is_halted());
        assert_eq!(
            breaker.snapshot().reason,
            Some(HaltReason::DrawdownExceeded)
        );
        assert!(breaker.snapshot().resume_at.is_some());
    }

    #[test]
    fn test_win_rate_floor_after_min_trades() {
        // 3 wins in 10 settled trades, floor 0.5 with min 10: the
        // breaker must halt exactly when the 10th trade settles.
        let breaker = breaker();

        for i in 0..9 {
            let is_win = i < 3;
            breaker.record_trade(if is_win { dec!(1) } else { dec!(-1) }, is_win);
            assert!(!breaker.is_halted(), "halted early at trade {}", i + 1);
        }

        breaker.record_trade(dec!(-1), false);
        assert!(breaker.is_halted());
        assert_eq!(
            breaker.snapshot().reason,
            Some(HaltReason::WinRateBelowFloor)
        );
    }

    #[test]
    fn test_healthy_win_rate_never_halts() {
        let breaker = breaker();
        for i in 0..20 {
            let is_win = i % 2 == 0;
            breaker.record_trade(if is_win { dec!(1) } else { dec!(-1) }, is_win);
        }
        assert!(!breaker.is_halted());
    }

    #[test]
    fn test_first_halt_reason_wins() {
        let breaker = breaker();
        breaker.halt_manual();
        breaker.update_drawdown(dec!(0.5));

        assert_eq!(breaker.snapshot().reason, Some(HaltReason::Manual));
    }

    #[test]
    fn test_manual_halt_has_no_auto_resume() {
        let breaker = breaker();
        breaker.halt_manual();

        assert!(breaker.is_halted());
        assert!(breaker.snapshot().resume_at.is_none());

        breaker.resume();
        assert!(!breaker.is_halted());
        assert_eq!(breaker.size_factor(), dec!(1));
    }

    #[test]
    fn test_cooldown_then_reduced_size_recovery() {
        let config = BreakerConfig {
            cooldown_secs: 0,
            recovery_trades: 2,
            recovery_size_factor: dec!(0.5),
        };
        let breaker = CircuitBreaker::new(RiskParameters::default(), config);

        breaker.update_drawdown(dec!(0.2));
        assert!(breaker.is_halted());

        // Cooldown of zero: once drawdown recovers, the next check
        // rolls into recovery at reduced size.
        breaker.update_drawdown(dec!(0.05));
        assert!(!breaker.is_halted());
        assert_eq!(breaker.size_factor(), dec!(0.5));
        assert_eq!(breaker.snapshot().recovery_trades_left, 2);

        breaker.record_trade(dec!(1), true);
        assert_eq!(breaker.size_factor(), dec!(0.5));
        breaker.record_trade(dec!(1), true);
        assert_eq!(breaker.size_factor(), dec!(1));
    }

    #[test]
    fn test_no_resume_while_drawdown_excessive() {
        let config = BreakerConfig {
            cooldown_secs: 0,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(RiskParameters::default(), config);

        breaker.update_drawdown(dec!(0.2));
        // Cooldown already elapsed, but equity has not recovered: the
        // halt must hold as long as drawdown exceeds the limit.
        assert!(breaker.is_halted());
        assert!(breaker.is_halted());
        assert_eq!(breaker.snapshot().drawdown, dec!(0.2));

        breaker.update_drawdown(dec!(0.05));
        assert!(!breaker.is_halted());
    }

    #[test]
    fn test_win_rate_sample_restarts_after_resume() {
        let config = BreakerConfig {
            cooldown_secs: 0,
            recovery_trades: 3,
            recovery_size_factor: dec!(0.5),
        };
        let breaker = CircuitBreaker::new(RiskParameters::default(), config);

        // 3 wins in 10 settles trips the floor. The snapshot shows the
        // halt; is_halted() itself would already roll into recovery
        // since the cooldown is zero and drawdown is fine.
        for i in 0..10 {
            let is_win = i < 3;
            breaker.record_trade(if is_win { dec!(1) } else { dec!(-1) }, is_win);
        }
        assert!(breaker.snapshot().halted);
        assert_eq!(
            breaker.snapshot().reason,
            Some(HaltReason::WinRateBelowFloor)
        );

        // Resumes into recovery with a fresh sample: the first settled
        // win must not re-trip the floor against the old record.
        assert!(!breaker.is_halted());
        breaker.record_trade(dec!(1), true);
        assert!(!breaker.is_halted());
        assert_eq!(breaker.snapshot().trades_settled, 1);
        assert_eq!(breaker.snapshot().trades_won, 1);
    }

    #[test]
    fn test_manual_resume_restarts_win_rate_sample() {
        let breaker = breaker();
        for i in 0..10 {
            let is_win = i < 3;
            breaker.record_trade(if is_win { dec!(1) } else { dec!(-1) }, is_win);
        }
        assert!(breaker.is_halted());

        breaker.resume();
        breaker.record_trade(dec!(-1), false);
        assert!(!breaker.is_halted());
        assert_eq!(breaker.snapshot().trades_settled, 1);
    }

    #[test]
    fn test_resume_skips_recovery() {
        let breaker = breaker();
        breaker.update_drawdown(dec!(0.2));
        assert!(breaker.is_halted());

        breaker.resume();
        assert!(!breaker.is_halted());
        assert_eq!(breaker.size_factor(), dec!(1));
        assert_eq!(breaker.snapshot().recovery_trades_left, 0);
    }
}
