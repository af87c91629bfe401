//! Telemetry configuration for redline.
//!
//! This module defines logging and observability settings.

use serde::Deserialize;

/// Telemetry configuration settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    /// Service name attached to log output.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            json: false,
        }
    }
}

pub(super) fn default_service_name() -> String {
    "redline".to_string()
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}
