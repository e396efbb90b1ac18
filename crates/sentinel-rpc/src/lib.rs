//! Resilient JSON-RPC plumbing: weighted endpoint pool with failover,
//! background health probing and token-bucket rate admission.

pub mod admission;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod prober;

pub use admission::{Admission, BucketConfig, RateAdmission, Scope};
pub use endpoint::{EndpointHealth, EndpointState, HealthThresholds};
pub use error::{RpcResult, SubmissionError};
pub use pool::{HttpTransport, OrderRequest, PoolConfig, RpcEndpointPool, RpcTransport, SubmissionReceipt};
pub use prober::{spawn_prober, ProberConfig};
