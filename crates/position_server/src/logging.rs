//! Logging system setup and configuration
//!
//! Installs the global tracing subscriber. `RUST_LOG` takes precedence over
//! the configured level when set.

use crate::config::LoggingSettings;
use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system
///
/// # Arguments
/// * `config` - Logging section of the application configuration
///
/// # Environment Variables
/// * `RUST_LOG` - Override the configured filter (e.g., "debug", "position_system=trace")
pub fn setup_logging(config: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}
