//! Prometheus metrics for observability and monitoring.
//!
//! The Store records its metrics through the `metrics` facade, which is a no-op until
//! a recorder is installed. Hosts that want Prometheus output install one here:
//!
//! ```rust,no_run
//! use turnstile_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let exposition = recorder.render();
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//!
//! - `store_commands_total{command}`: commands submitted
//! - `store_commits_total{command}`: commands committed
//! - `store_rollbacks_total{command,reason}`: commands rolled back (`rejected` or `payment`)
//! - `store_payments_forwarded_total`: payment forwards that succeeded
//! - `store_payments_amount_total`: units forwarded
//! - `store_reducer_duration_seconds`: reducer execution time

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Describe all Store metrics and install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built, or if another global recorder
    /// is already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("store_commands_total", "Total number of commands submitted");
    describe_counter!("store_commits_total", "Total number of commands committed");
    describe_counter!(
        "store_rollbacks_total",
        "Total number of commands rolled back, by reason"
    );
    describe_counter!(
        "store_payments_forwarded_total",
        "Total number of payments forwarded"
    );
    describe_counter!(
        "store_payments_amount_total",
        "Total units forwarded to payees"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time taken to validate and stage a command"
    );
}
