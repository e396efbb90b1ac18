//! Exit supervision for open positions.
//!
//! Pure decision logic applied on every price tick: trailing-stop
//! ratchet first, then stop/target crossing. The manager owns the
//! position and performs the resulting transition.

use rust_decimal::Decimal;
use sentinel_core::{CloseReason, Position, Price};
use tracing::debug;

/// Outcome of supervising one price tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Stop after any trailing ratchet.
    pub stop_price: Price,
    /// Unrealized PnL at this price.
    pub unrealized_pnl: Decimal,
    /// Exit trigger, if any.
    pub close: Option<CloseReason>,
}

/// Apply a price tick to an open position.
///
/// Mutates the trailing state and the stop price in place. The
/// trailing ratchet runs before the crossing checks so a tick that
/// makes a new high cannot also stop out on the ratcheted level.
pub fn supervise_tick(position: &mut Position, price: Price) -> TickOutcome {
    if let Some(new_stop) =
        position
            .trailing
            .ratchet(position.side, price, position.stop_price)
    {
        debug!(
            position_id = %position.id,
            old_stop = %position.stop_price,
            new_stop = %new_stop,
            "Trailing stop ratcheted"
        );
        position.stop_price = new_stop;
    }

    let close = if position.stop_hit(price) {
        // Once the ratchet has moved the stop, a crossing is a
        // trailing exit rather than the original loss stop.
        if position.trailing.best_price != position.entry_price {
            Some(CloseReason::TrailingStop)
        } else {
            Some(CloseReason::StopLoss)
        }
    } else if position.target_hit(price) {
        Some(CloseReason::TakeProfit)
    } else {
        None
    };

    TickOutcome {
        stop_price: position.stop_price,
        unrealized_pnl: position.pnl_at(price),
        close,
    }
}

/// Whether a fill price breaches the slippage tolerance against the
/// reference price, in basis points.
#[must_use]
pub fn slippage_exceeded(reference: Price, fill: Price, tolerance_bps: Decimal) -> bool {
    match fill.bps_from(reference) {
        Some(bps) => bps.abs() > tolerance_bps,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentinel_core::{Side, Size, TokenId};

    fn long() -> Position {
        Position::pending(
            TokenId::new("SOL").unwrap(),
            Side::Buy,
            Price::new(dec!(10)),
            Size::new(dec!(2)),
            Price::new(dec!(9.5)),
            Price::new(dec!(11)),
        )
    }

    #[test]
    fn test_tick_inside_band_ratchets_without_close() {
        let mut pos = long();
        let outcome = supervise_tick(&mut pos, Price::new(dec!(10.2)));

        assert!(outcome.close.is_none());
        assert_eq!(outcome.unrealized_pnl, dec!(0.4));
        // Any new high ratchets: stop follows to 10.2 - 0.5.
        assert_eq!(pos.stop_price, Price::new(dec!(9.7)));
    }

    #[test]
    fn test_tick_below_entry_leaves_stop_in_place() {
        let mut pos = long();
        let outcome = supervise_tick(&mut pos, Price::new(dec!(9.8)));

        assert!(outcome.close.is_none());
        assert_eq!(outcome.unrealized_pnl, dec!(-0.4));
        assert_eq!(pos.stop_price, Price::new(dec!(9.5)));
    }

    #[test]
    fn test_stop_loss_triggers() {
        let mut pos = long();
        let outcome = supervise_tick(&mut pos, Price::new(dec!(9.4)));

        assert_eq!(outcome.close, Some(CloseReason::StopLoss));
        assert_eq!(outcome.unrealized_pnl, dec!(-1.2));
    }

    #[test]
    fn test_take_profit_triggers() {
        let mut pos = long();
        let outcome = supervise_tick(&mut pos, Price::new(dec!(11)));

        assert_eq!(outcome.close, Some(CloseReason::TakeProfit));
    }

    #[test]
    fn test_trailing_ratchet_then_trailing_exit() {
        let mut pos = long();

        // New high moves the stop up to 10.5 - 0.5 = 10.0.
        let outcome = supervise_tick(&mut pos, Price::new(dec!(10.5)));
        assert!(outcome.close.is_none());
        assert_eq!(pos.stop_price, Price::new(dec!(10.0)));

        // Retrace through the ratcheted stop exits in profit.
        let outcome = supervise_tick(&mut pos, Price::new(dec!(10.0)));
        assert_eq!(outcome.close, Some(CloseReason::TrailingStop));
    }

    #[test]
    fn test_short_supervision() {
        let mut pos = Position::pending(
            TokenId::new("SOL").unwrap(),
            Side::Sell,
            Price::new(dec!(10)),
            Size::new(dec!(1)),
            Price::new(dec!(10.5)),
            Price::new(dec!(9)),
        );

        let outcome = supervise_tick(&mut pos, Price::new(dec!(9.5)));
        assert!(outcome.close.is_none());
        assert_eq!(pos.stop_price, Price::new(dec!(10.0)));

        let outcome = supervise_tick(&mut pos, Price::new(dec!(9)));
        assert_eq!(outcome.close, Some(CloseReason::TakeProfit));
    }

    #[test]
    fn test_slippage_tolerance() {
        // 100 bps tolerance on a reference of 10: 0.1 either way.
        let reference = Price::new(dec!(10));
        assert!(!slippage_exceeded(reference, Price::new(dec!(10.05)), dec!(100)));
        assert!(slippage_exceeded(reference, Price::new(dec!(10.2)), dec!(100)));
        assert!(slippage_exceeded(reference, Price::new(dec!(9.8)), dec!(100)));
    }
}
