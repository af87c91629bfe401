//! Options controlling line matching, hunk grouping and inline highlighting.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by the diff engine.
///
/// Computing a diff never fails for text input; only option construction can.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiffError {
    /// An option value is outside its valid range.
    #[error("Invalid diff options: {0}")]
    InvalidOptions(String),
}

/// Immutable set of options for a diff computation.
///
/// Use one of the presets or [`DiffOptions::builder`] for custom values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiffOptions {
    context_lines: usize,
    hunk_separation_threshold: usize,
    compute_inline_diffs: bool,
    ignore_whitespace: bool,
    ignore_case: bool,
    trim_trailing_whitespace: bool,
    max_inline_diff_line_length: usize,
    inline_diff_similarity_threshold: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            hunk_separation_threshold: 6,
            compute_inline_diffs: true,
            ignore_whitespace: false,
            ignore_case: false,
            trim_trailing_whitespace: false,
            max_inline_diff_line_length: 500,
            inline_diff_similarity_threshold: 0.3,
        }
    }
}

impl DiffOptions {
    /// Minimal context, for narrow previews.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            context_lines: 1,
            hunk_separation_threshold: 4,
            ..Self::default()
        }
    }

    /// Generous context, for full-file review.
    #[must_use]
    pub fn full() -> Self {
        Self {
            context_lines: 10,
            hunk_separation_threshold: 20,
            ..Self::default()
        }
    }

    /// Default options with whitespace ignored during line matching.
    #[must_use]
    pub fn ignoring_whitespace() -> Self {
        Self {
            ignore_whitespace: true,
            ..Self::default()
        }
    }

    /// Starts a builder seeded with the default options.
    #[must_use]
    pub fn builder() -> DiffOptionsBuilder {
        DiffOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Unchanged lines shown around each change.
    #[must_use]
    pub const fn context_lines(&self) -> usize {
        self.context_lines
    }

    /// Largest unchanged gap that still keeps two changes in one hunk.
    #[must_use]
    pub const fn hunk_separation_threshold(&self) -> usize {
        self.hunk_separation_threshold
    }

    /// Whether modified lines get character-level highlighting.
    #[must_use]
    pub const fn compute_inline_diffs(&self) -> bool {
        self.compute_inline_diffs
    }

    /// Whether whitespace is ignored when matching lines.
    #[must_use]
    pub const fn ignore_whitespace(&self) -> bool {
        self.ignore_whitespace
    }

    /// Whether case is ignored when matching lines.
    #[must_use]
    pub const fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Whether trailing whitespace is ignored when matching lines.
    #[must_use]
    pub const fn trim_trailing_whitespace(&self) -> bool {
        self.trim_trailing_whitespace
    }

    /// Lines longer than this (in chars) skip character-level diffing.
    #[must_use]
    pub const fn max_inline_diff_line_length(&self) -> usize {
        self.max_inline_diff_line_length
    }

    /// Minimum similarity for a modified pair to be highlighted inline.
    #[must_use]
    pub const fn inline_diff_similarity_threshold(&self) -> f64 {
        self.inline_diff_similarity_threshold
    }

    /// Builds the key used to compare a line, leaving the displayed text untouched.
    pub(crate) fn comparison_key(&self, line: &str) -> String {
        let mut key: String = if self.ignore_whitespace {
            line.chars().filter(|c| !c.is_whitespace()).collect()
        } else if self.trim_trailing_whitespace {
            line.trim_end().to_string()
        } else {
            line.to_string()
        };
        if self.ignore_case {
            key = key.to_lowercase();
        }
        key
    }
}

/// Builder for [`DiffOptions`] that validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct DiffOptionsBuilder {
    options: DiffOptions,
}

impl DiffOptionsBuilder {
    /// Sets the number of context lines.
    #[must_use]
    pub fn context_lines(mut self, lines: usize) -> Self {
        self.options.context_lines = lines;
        self
    }

    /// Sets the hunk separation threshold.
    #[must_use]
    pub fn hunk_separation_threshold(mut self, lines: usize) -> Self {
        self.options.hunk_separation_threshold = lines;
        self
    }

    /// Enables or disables inline diffs.
    #[must_use]
    pub fn compute_inline_diffs(mut self, enabled: bool) -> Self {
        self.options.compute_inline_diffs = enabled;
        self
    }

    /// Enables or disables whitespace-insensitive matching.
    #[must_use]
    pub fn ignore_whitespace(mut self, enabled: bool) -> Self {
        self.options.ignore_whitespace = enabled;
        self
    }

    /// Enables or disables case-insensitive matching.
    #[must_use]
    pub fn ignore_case(mut self, enabled: bool) -> Self {
        self.options.ignore_case = enabled;
        self
    }

    /// Enables or disables trailing-whitespace-insensitive matching.
    #[must_use]
    pub fn trim_trailing_whitespace(mut self, enabled: bool) -> Self {
        self.options.trim_trailing_whitespace = enabled;
        self
    }

    /// Sets the maximum line length for inline diffs.
    #[must_use]
    pub fn max_inline_diff_line_length(mut self, chars: usize) -> Self {
        self.options.max_inline_diff_line_length = chars;
        self
    }

    /// Sets the inline similarity threshold (`0.0..=1.0`).
    #[must_use]
    pub fn inline_diff_similarity_threshold(mut self, threshold: f64) -> Self {
        self.options.inline_diff_similarity_threshold = threshold;
        self
    }

    /// Validates and returns the options.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::InvalidOptions`] if the similarity threshold is not
    /// a finite number between 0 and 1.
    pub fn build(self) -> Result<DiffOptions, DiffError> {
        let threshold = self.options.inline_diff_similarity_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(DiffError::InvalidOptions(format!(
                "inline_diff_similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(self.options)
    }
}
