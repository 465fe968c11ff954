//! Logging setup
//!
//! The engine logs through `tracing`; test harnesses that want to see the
//! match/no-match decisions call [`init_tracing`] once at startup.

use crate::utils::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this more than once is not an
/// error; later calls leave the first subscriber in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let installed = if config.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let config = LoggingConfig::default();
        init_tracing(&config).unwrap();
        init_tracing(&config).unwrap();
    }
}
