//! Shared utilities: error types and engine configuration

pub mod config;
pub mod errors;

pub use config::{DispatchConfig, EngineConfig, LoggingConfig, NetworkConfig};
pub use errors::{EngineError, Result};
