//! Logging setup

use tracing_subscriber::EnvFilter;

use armsync_core::{ArmsyncError, ArmsyncResult};

use crate::config::LoggingConfig;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> ArmsyncResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ArmsyncError::Config(format!("bad log filter: {}", e)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ArmsyncError::Config(e.to_string()))
}
