//! Structured logging setup.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Telemetry setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("subscriber already set")]
    AlreadySet,
}

/// Initialize structured logging (JSON) with env filter.
/// Set RUST_LOG, e.g., "info,ingest=debug".
pub fn init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadySet)
}

/// Plain-text variant for local development and tests.
pub fn init_plain_logging() -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt::layer());
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadySet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_already_set() {
        // Whichever install wins, the loser must surface AlreadySet instead
        // of silently doing nothing.
        let _ = init_plain_logging();
        assert!(matches!(init_plain_logging(), Err(TelemetryError::AlreadySet)));
    }
}
