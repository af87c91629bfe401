//! Configuration management for redline.
//!
//! Settings are layered: built-in defaults first, then `REDLINE__*`
//! environment variables using `__` as the section separator, for example
//! `REDLINE__BACKUP__MAX_AGE_SECS=3600`.
//!
//! # Example
//!
//! ```
//! use redline_kernel::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! assert!(settings.history.max_records_per_file > 0);
//! ```

pub mod backup;
pub mod diff;
pub mod history;
pub mod streaming;
pub mod telemetry;

pub use backup::BackupSettings;
pub use diff::DiffSettings;
pub use history::HistorySettings;
pub use streaming::StreamingSettings;
pub use telemetry::TelemetrySettings;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    /// Diff engine settings.
    #[serde(default)]
    pub diff: DiffSettings,
    /// Streaming coordinator settings.
    #[serde(default)]
    pub streaming: StreamingSettings,
    /// Backup store settings.
    #[serde(default)]
    pub backup: BackupSettings,
    /// Undo history settings.
    #[serde(default)]
    pub history: HistorySettings,
    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Creates a new settings instance from environment variables and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("REDLINE"))
    }

    /// Builds settings from defaults overlaid with the given environment source.
    ///
    /// The separator is always `__`; callers only choose the prefix and,
    /// in tests, an explicit variable map.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Start with default values
            .set_default("telemetry.service_name", telemetry::default_service_name())?
            .set_default("telemetry.log_level", telemetry::default_log_level())?
            .set_default(
                "backup.directory",
                backup::default_directory().to_string_lossy().into_owned(),
            )?
            // Merge in Environment variables
            .add_source(environment.separator("__").try_parsing(true))
            .build()?;

        s.try_deserialize()
    }
}
