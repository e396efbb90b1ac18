//! Core domain types for the sentinel execution core.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: precision-safe numeric types
//! - `TokenId`, `Side`, `TradeCandidate`: upstream signal shapes
//! - `AccountState`, `RiskParameters`: account and risk configuration
//! - `Position`, `PositionStatus`: lifecycle state

pub mod account;
pub mod candidate;
pub mod decimal;
pub mod error;
pub mod params;
pub mod position;

pub use account::AccountState;
pub use candidate::{Side, TokenId, TradeCandidate};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use params::{RiskParameters, StopModel};
pub use position::{CloseReason, Position, PositionId, PositionStatus, TrailingStop};
