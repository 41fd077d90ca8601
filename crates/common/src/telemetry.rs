//! Tracing subscriber setup for applications embedding the archive tooling

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber described by `config`.
///
/// `RUST_LOG` wins over `config.log_level` when set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    installed.map_err(|e| AppError::Configuration {
        message: format!("Failed to install tracing subscriber: {}", e),
    })?;

    tracing::info!(service = %config.service_name, version = crate::VERSION, "Tracing initialized");
    Ok(())
}
