//! Change history configuration for redline.

use serde::Deserialize;

/// Undo history settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    /// Records kept per file before the oldest is evicted (default: 50)
    #[serde(default = "default_max_records")]
    pub max_records_per_file: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_records_per_file: default_max_records(),
        }
    }
}

fn default_max_records() -> usize {
    50
}
