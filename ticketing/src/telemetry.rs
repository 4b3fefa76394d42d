//! Logging and metrics setup for hosts embedding the ledger.

use crate::config::ObservabilityConfig;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_runtime::metrics::{MetricsError, MetricsRecorder};

/// Errors from telemetry setup
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter directive did not parse
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// Directive as configured
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),

    /// The metrics recorder could not be installed
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Install the global `tracing` subscriber
///
/// # Errors
///
/// Returns error if the configured filter is invalid or a subscriber is already
/// installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::InvalidFilter {
            directive: config.log_level.clone(),
            reason: e.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(level = %config.log_level, "Tracing initialized");
    Ok(())
}

/// Install the Prometheus recorder if metrics are enabled
///
/// # Errors
///
/// Returns error if the recorder cannot be installed.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<Option<MetricsRecorder>, TelemetryError> {
    if !config.metrics_enabled {
        return Ok(None);
    }
    Ok(Some(MetricsRecorder::install()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_reported() {
        let config = ObservabilityConfig {
            log_level: "turnstile=loudest".to_string(),
            metrics_enabled: false,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_metrics_disabled_installs_nothing() {
        let config = ObservabilityConfig::default();
        assert!(init_metrics(&config).unwrap_or(None).is_none());
    }
}
