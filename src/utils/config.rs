//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `mocknet.toml` in the working directory, then `MOCKNET__*` environment
//! variables (e.g. `MOCKNET__DISPATCH__BODY_MATCH_TIMEOUT_MS=250`).

use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Request dispatch settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long to wait for a request body before body matchers give up
    pub body_match_timeout_ms: u64,

    /// Chunks buffered between a streaming body producer and its reader
    pub body_channel_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            body_match_timeout_ms: 5_000,
            body_channel_capacity: 16,
        }
    }
}

impl DispatchConfig {
    pub fn body_match_timeout(&self) -> Duration {
        Duration::from_millis(self.body_match_timeout_ms)
    }
}

/// Initial network gate state
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Allow unmatched requests to reach the real network
    pub allow_net_connect: bool,

    /// Host patterns (wildcards allowed) that stay reachable when disabled
    pub allowed_hosts: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            allow_net_connect: true,
            allowed_hosts: Vec::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `mocknet.toml` (optional) and the environment
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("mocknet").required(false))
            .add_source(Self::environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from an explicit file, still honoring the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn environment() -> Environment {
        Environment::with_prefix("MOCKNET")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
