//! Trade candidates pushed by the upstream signal producer.
//!
//! A `TradeCandidate` carries everything the risk gate needs to make an
//! accept/reject decision: reference price, a volatility unit for
//! stop/target derivation, a liquidity estimate, and the candidate's
//! correlation to the open book. The core never mutates candidates.

use crate::decimal::Price;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique token identifier (mint address or exchange symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Create a token id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidTokenId("empty token id".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side (used when closing a position).
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A proposed trade from the upstream strategy collaborator.
///
/// Read-only to the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCandidate {
    /// Token to trade.
    pub token: TokenId,
    /// Trade direction.
    pub side: Side,
    /// Reference price at signal time.
    pub reference_price: Price,
    /// Volatility unit (e.g. ATR) in price terms.
    pub volatility: Decimal,
    /// Liquidity estimate in quote-currency terms.
    pub liquidity: Decimal,
    /// Correlation to the open book, in [-1, 1].
    pub correlation: Decimal,
    /// When the signal was produced.
    pub signaled_at: DateTime<Utc>,
}

impl TradeCandidate {
    pub fn new(
        token: TokenId,
        side: Side,
        reference_price: Price,
        volatility: Decimal,
        liquidity: Decimal,
        correlation: Decimal,
    ) -> Self {
        Self {
            token,
            side,
            reference_price,
            volatility,
            liquidity,
            correlation,
            signaled_at: Utc::now(),
        }
    }

    /// Age of the signal in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.signaled_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_token_id_rejects_empty() {
        assert!(TokenId::new("").is_err());
        assert!(TokenId::new("   ").is_err());
        assert!(TokenId::new("SOL").is_ok());
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_candidate_construction() {
        let candidate = TradeCandidate::new(
            TokenId::new("SOL").unwrap(),
            Side::Buy,
            Price::new(dec!(10)),
            dec!(0.25),
            dec!(50000),
            dec!(0.1),
        );
        assert_eq!(candidate.side, Side::Buy);
        assert!(candidate.age_ms() >= 0);
    }
}
