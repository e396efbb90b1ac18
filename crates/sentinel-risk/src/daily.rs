//! Rolling trade-activity window for the frequency gate.
//!
//! Tracks trades per UTC day and the time of the last trade. The
//! counter rolls over automatically at UTC midnight.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

#[derive(Debug)]
struct ActivityInner {
    day: NaiveDate,
    trades_today: u32,
    last_trade_at: Option<DateTime<Utc>>,
}

/// Trade activity tracker shared between the gate and the lifecycle
/// manager.
#[derive(Debug)]
pub struct TradeActivity {
    inner: Mutex<ActivityInner>,
}

impl Default for TradeActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl TradeActivity {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ActivityInner {
                day: Utc::now().date_naive(),
                trades_today: 0,
                last_trade_at: None,
            }),
        }
    }

    /// Record a submitted trade at `now`.
    pub fn record_trade(&self) {
        self.record_trade_at(Utc::now());
    }

    /// Record a trade at an explicit timestamp (testable).
    pub fn record_trade_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        Self::rollover(&mut inner, now);
        inner.trades_today += 1;
        inner.last_trade_at = Some(now);
    }

    /// Trades recorded today (UTC).
    #[must_use]
    pub fn trades_today(&self) -> u32 {
        let mut inner = self.inner.lock();
        Self::rollover(&mut inner, Utc::now());
        inner.trades_today
    }

    /// Seconds elapsed since the last trade, `None` if no trade yet.
    #[must_use]
    pub fn elapsed_since_last_secs(&self) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .last_trade_at
            .map(|t| (Utc::now() - t).num_seconds())
    }

    fn rollover(inner: &mut ActivityInner, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != inner.day {
            inner.day = today;
            inner.trades_today = 0;
        }
    }
}
