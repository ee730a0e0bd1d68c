//! # Logging
//!
//! `tracing` subscriber setup. `RUST_LOG` takes precedence over the
//! configured level.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Returns an error string if a subscriber is already installed; callers
/// usually ignore it (tests install their own).
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyvault_secret_provider={level},kvsecretctl={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    }
    .map_err(|e| e.to_string())
}
