//! Pre-trade risk controls: the gate, the sizer, the circuit breaker
//! and the trade-frequency tracker.

pub mod breaker;
pub mod daily;
pub mod error;
pub mod gate;
pub mod sizer;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState, HaltReason};
pub use daily::TradeActivity;
pub use error::{RiskError, RiskResult};
pub use gate::{RejectReason, RiskGate, SizingHint};
pub use sizer::{PositionSizer, Sizing, SizingError};
