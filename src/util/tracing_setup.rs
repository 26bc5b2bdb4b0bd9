//! Tracing/logging initialization

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber based on configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init(),
        _ => subscriber.with(fmt::layer().with_target(false)).try_init(),
    };

    installed.context("Failed to install tracing subscriber")
}
