//! Application assembly for the sentinel execution core.

pub mod app;
pub mod config;
pub mod control;
pub mod error;

pub use app::Application;
pub use config::{EndpointConfig, EngineConfig};
pub use control::EngineHandle;
pub use error::{EngineError, EngineResult};
