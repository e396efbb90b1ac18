//! Positions and their lifecycle states.
//!
//! A `Position` is owned exclusively by the lifecycle manager; one
//! writer at a time per position id.

use crate::candidate::{Side, TokenId};
use crate::decimal::{Price, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(Uuid);

impl PositionId {
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Accepted by the risk gate, not yet submitted.
    Pending,
    /// Submission sent, awaiting confirmation.
    Submitted,
    /// Confirmed on chain, under supervision.
    Open,
    /// Close submission in flight.
    Closing,
    /// Terminal: closed with realized PnL.
    Closed,
    /// Terminal: submission failed unrecoverably.
    Failed,
}

impl PositionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether a transition to `next` is legal.
    #[must_use]
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Open)
                | (Submitted, Failed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
                | (Closing, Open)
        )
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted => write!(f, "submitted"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Trailing stop that only moves in the favorable direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Distance between price and stop, fixed at entry.
    pub distance: Decimal,
    /// Best price seen since entry (high for longs, low for shorts).
    pub best_price: Price,
}

impl TrailingStop {
    #[must_use]
    pub fn new(distance: Decimal, entry: Price) -> Self {
        Self {
            distance,
            best_price: entry,
        }
    }

    /// Ratchet on a price update. Returns the new stop price if it
    /// improved, `None` otherwise. The stop never retreats.
    pub fn ratchet(&mut self, side: Side, price: Price, current_stop: Price) -> Option<Price> {
        match side {
            Side::Buy => {
                if price > self.best_price {
                    self.best_price = price;
                    let candidate = Price::new(price.inner() - self.distance);
                    if candidate > current_stop {
                        return Some(candidate);
                    }
                }
            }
            Side::Sell => {
                if price < self.best_price {
                    self.best_price = price;
                    let candidate = Price::new(price.inner() + self.distance);
                    if candidate < current_stop {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
            Self::TrailingStop => write!(f, "trailing_stop"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// An order's position record through its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique id.
    pub id: PositionId,
    /// Token traded.
    pub token: TokenId,
    /// Direction.
    pub side: Side,
    /// Average entry price.
    pub entry_price: Price,
    /// Quantity in token units.
    pub quantity: Size,
    /// Notional at entry (quantity * entry_price).
    pub notional: Decimal,
    /// Stop-loss price.
    pub stop_price: Price,
    /// Take-profit price.
    pub target_price: Price,
    /// Trailing-stop ratchet state.
    pub trailing: TrailingStop,
    /// Lifecycle state.
    pub status: PositionStatus,
    /// When the position record was created.
    pub opened_at: DateTime<Utc>,
    /// Realized PnL once closed.
    pub realized_pnl: Option<Decimal>,
    /// Close reason once closed.
    pub close_reason: Option<CloseReason>,
}

impl Position {
    /// Create a pending position from sized entry levels.
    #[must_use]
    pub fn pending(
        token: TokenId,
        side: Side,
        entry_price: Price,
        quantity: Size,
        stop_price: Price,
        target_price: Price,
    ) -> Self {
        let distance = (entry_price.inner() - stop_price.inner()).abs();
        Self {
            id: PositionId::new(),
            token,
            side,
            entry_price,
            quantity,
            notional: quantity.notional(entry_price),
            stop_price,
            target_price,
            trailing: TrailingStop::new(distance, entry_price),
            status: PositionStatus::Pending,
            opened_at: Utc::now(),
            realized_pnl: None,
            close_reason: None,
        }
    }

    /// PnL at a hypothetical exit price.
    #[must_use]
    pub fn pnl_at(&self, exit: Price) -> Decimal {
        let diff = match self.side {
            Side::Buy => exit.inner() - self.entry_price.inner(),
            Side::Sell => self.entry_price.inner() - exit.inner(),
        };
        diff * self.quantity.inner()
    }

    /// Whether the stop-loss is crossed at `price`.
    #[must_use]
    pub fn stop_hit(&self, price: Price) -> bool {
        match self.side {
            Side::Buy => price <= self.stop_price,
            Side::Sell => price >= self.stop_price,
        }
    }

    /// Whether the take-profit is crossed at `price`.
    #[must_use]
    pub fn target_hit(&self, price: Price) -> bool {
        match self.side {
            Side::Buy => price >= self.target_price,
            Side::Sell => price <= self.target_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
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
    fn test_status_transitions() {
        use PositionStatus::*;

        assert!(Pending.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Open));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Closed.can_transition_to(Open));
        assert!(!Failed.can_transition_to(Submitted));
        assert!(!Open.can_transition_to(Pending));
        assert!(Closed.is_terminal());
        assert!(Failed.is_terminal());
    }

    #[test]
    fn test_stop_and_target_crossing_long() {
        let pos = long_position();

        assert!(pos.stop_hit(Price::new(dec!(9.5))));
        assert!(pos.stop_hit(Price::new(dec!(9.4))));
        assert!(!pos.stop_hit(Price::new(dec!(9.6))));

        assert!(pos.target_hit(Price::new(dec!(11))));
        assert!(!pos.target_hit(Price::new(dec!(10.9))));
    }

    #[test]
    fn test_pnl_long_and_short() {
        let pos = long_position();
        assert_eq!(pos.pnl_at(Price::new(dec!(11))), dec!(2));
        assert_eq!(pos.pnl_at(Price::new(dec!(9.5))), dec!(-1));

        let short = Position::pending(
            TokenId::new("SOL").unwrap(),
            Side::Sell,
            Price::new(dec!(10)),
            Size::new(dec!(2)),
            Price::new(dec!(10.5)),
            Price::new(dec!(9)),
        );
        assert_eq!(short.pnl_at(Price::new(dec!(9))), dec!(2));
    }

    #[test]
    fn test_trailing_ratchet_never_retreats() {
        let mut pos = long_position();

        // Price moves up 1: stop may move to 10 - 0.5... distance is 0.5.
        let new_stop = pos
            .trailing
            .ratchet(Side::Buy, Price::new(dec!(10.5)), pos.stop_price);
        assert_eq!(new_stop, Some(Price::new(dec!(10.0))));
        pos.stop_price = new_stop.unwrap();

        // Price retraces: no change.
        let none = pos
            .trailing
            .ratchet(Side::Buy, Price::new(dec!(10.2)), pos.stop_price);
        assert!(none.is_none());
        assert_eq!(pos.stop_price, Price::new(dec!(10.0)));

        // New high ratchets again.
        let higher = pos
            .trailing
            .ratchet(Side::Buy, Price::new(dec!(11)), pos.stop_price);
        assert_eq!(higher, Some(Price::new(dec!(10.5))));
    }

    #[test]
    fn test_trailing_ratchet_short() {
        let mut short = Position::pending(
            TokenId::new("SOL").unwrap(),
            Side::Sell,
            Price::new(dec!(10)),
            Size::new(dec!(1)),
            Price::new(dec!(10.5)),
            Price::new(dec!(9)),
        );

        let new_stop = short
            .trailing
            .ratchet(Side::Sell, Price::new(dec!(9.5)), short.stop_price);
        assert_eq!(new_stop, Some(Price::new(dec!(10.0))));
        short.stop_price = new_stop.unwrap();

        // Price back up: stop holds.
        let none = short
            .trailing
            .ratchet(Side::Sell, Price::new(dec!(9.8)), short.stop_price);
        assert!(none.is_none());
    }
}
