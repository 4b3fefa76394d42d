//! Configuration management for the ticket ledger.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::types::TransferPayee;
use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Ledger policy
    pub ledger: LedgerConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// Ledger policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Who is paid when tickets move between holders (default: the original holder)
    pub transfer_payee: TransferPayee,
    /// Require buyers and transfer recipients to be registered (default: false)
    pub require_registration: bool,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full `EnvFilter`)
    pub log_level: String,
    /// Install the Prometheus recorder at startup
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            ledger: LedgerConfig {
                transfer_payee: lookup("TURNSTILE_TRANSFER_PAYEE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.ledger.transfer_payee),
                require_registration: lookup("TURNSTILE_REQUIRE_REGISTRATION")
                    .and_then(|s| parse_flag(&s))
                    .unwrap_or(defaults.ledger.require_registration),
            },
            observability: ObservabilityConfig {
                log_level: lookup("RUST_LOG").unwrap_or(defaults.observability.log_level),
                metrics_enabled: lookup("TURNSTILE_METRICS_ENABLED")
                    .and_then(|s| parse_flag(&s))
                    .unwrap_or(defaults.observability.metrics_enabled),
            },
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
