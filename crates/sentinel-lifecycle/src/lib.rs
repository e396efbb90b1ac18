//! Order lifecycle orchestration: candidate intake through the risk
//! gate and sizer, submission with failover, position supervision and
//! the single-writer account ledger.

pub mod error;
pub mod ledger;
pub mod manager;
pub mod supervisor;

pub use error::{LifecycleError, LifecycleResult};
pub use ledger::AccountLedger;
pub use manager::{LifecycleDeps, LifecycleHandle, ManagerConfig, OrderLifecycleManager};
pub use supervisor::{slippage_exceeded, supervise_tick, TickOutcome};
