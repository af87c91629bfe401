//! Streaming recomputation configuration for redline.

use serde::Deserialize;
use std::time::Duration;

/// Settings for the streaming diff coordinator.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamingSettings {
    /// Quiet period before a changed block is recomputed, in milliseconds (default: 300)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl StreamingSettings {
    /// The debounce window as a [`Duration`].
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    300
}
