//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level so a single pod can be turned
//! up without editing its config file.

use crate::settings::{GlobalConfig, LogFormat};
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(global: &GlobalConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&global.log_level)
            .with_context(|| format!("Invalid log level '{}'", global.log_level)),
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_tracing(global: &GlobalConfig) -> Result<()> {
    let filter = build_filter(global)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match global.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    };
    result.map_err(|err| anyhow!("Failed to install tracing subscriber: {}", err))?;

    tracing::info!(
        level = %global.log_level,
        format = ?global.log_format,
        "Tracing initialized"
    );
    Ok(())
}
