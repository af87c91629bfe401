//! Diff configuration for redline.
//!
//! This module defines the defaults used when building [`DiffOptions`].

use serde::Deserialize;

use crate::diff::{DiffError, DiffOptions};

/// Diff engine settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DiffSettings {
    /// Unchanged lines shown around each change (default: 3)
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Largest unchanged gap merged into one hunk (default: 6)
    #[serde(default = "default_hunk_separation")]
    pub hunk_separation_threshold: usize,

    /// Character-level highlighting of modified lines (default: true)
    #[serde(default = "default_true")]
    pub compute_inline_diffs: bool,

    /// Ignore all whitespace when matching lines (default: false)
    #[serde(default)]
    pub ignore_whitespace: bool,

    /// Ignore case when matching lines (default: false)
    #[serde(default)]
    pub ignore_case: bool,

    /// Ignore trailing whitespace when matching lines (default: false)
    #[serde(default)]
    pub trim_trailing_whitespace: bool,

    /// Longest line, in chars, that still gets inline changes (default: 500)
    #[serde(default = "default_max_inline_length")]
    pub max_inline_diff_line_length: usize,

    /// Minimum similarity for inline highlighting (default: 0.3)
    #[serde(default = "default_inline_threshold")]
    pub inline_diff_similarity_threshold: f64,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            hunk_separation_threshold: default_hunk_separation(),
            compute_inline_diffs: default_true(),
            ignore_whitespace: false,
            ignore_case: false,
            trim_trailing_whitespace: false,
            max_inline_diff_line_length: default_max_inline_length(),
            inline_diff_similarity_threshold: default_inline_threshold(),
        }
    }
}

impl DiffSettings {
    /// Validates the settings into [`DiffOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::InvalidOptions`] if the similarity threshold is out
    /// of range.
    pub fn to_options(&self) -> Result<DiffOptions, DiffError> {
        DiffOptions::builder()
            .context_lines(self.context_lines)
            .hunk_separation_threshold(self.hunk_separation_threshold)
            .compute_inline_diffs(self.compute_inline_diffs)
            .ignore_whitespace(self.ignore_whitespace)
            .ignore_case(self.ignore_case)
            .trim_trailing_whitespace(self.trim_trailing_whitespace)
            .max_inline_diff_line_length(self.max_inline_diff_line_length)
            .inline_diff_similarity_threshold(self.inline_diff_similarity_threshold)
            .build()
    }
}

fn default_context_lines() -> usize {
    3
}

fn default_hunk_separation() -> usize {
    6
}

fn default_true() -> bool {
    true
}

fn default_max_inline_length() -> usize {
    500
}

fn default_inline_threshold() -> f64 {
    0.3
}
