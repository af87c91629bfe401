//! Backup configuration for redline.
//!
//! This module defines where backups live and how long they are kept.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Backup store settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    /// Directory holding backup copies (default: system temp dir + "redline-backups")
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Age after which a backup is pruned, in seconds (default: 7 days)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Interval between background cleanups, in seconds (default: 1 hour)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            max_age_secs: default_max_age_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl BackupSettings {
    /// Maximum backup age as a [`Duration`].
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Cleanup interval as a [`Duration`].
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

pub(super) fn default_directory() -> PathBuf {
    std::env::temp_dir().join("redline-backups")
}

fn default_max_age_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    60 * 60
}
