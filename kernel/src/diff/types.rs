//! Diff result types.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a [`DiffLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    /// Present on both sides.
    Unchanged,
    /// Only present in the proposed text.
    Added,
    /// Only present in the original text.
    Removed,
    /// A removed/added pair merged into one line.
    Modified,
}

impl DiffLineKind {
    /// Returns true for every kind except `Unchanged`.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Kind of an [`InlineChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineChangeKind {
    /// Text only in the proposed line.
    Added,
    /// Text only in the original line.
    Removed,
    /// Text shared by both lines.
    Unchanged,
}

/// A character range inside a modified line.
///
/// Columns count chars. `Removed` ranges index the original line; `Added` and
/// `Unchanged` ranges index the proposed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineChange {
    /// What happened to this range.
    pub kind: InlineChangeKind,
    /// First column of the range.
    pub start_column: usize,
    /// Number of chars in the range.
    pub length: usize,
    /// The text of the range.
    pub text: String,
}

impl InlineChange {
    /// Column just past the range.
    #[must_use]
    pub const fn end_column(&self) -> usize {
        self.start_column + self.length
    }
}

/// One line of a diff.
///
/// Line numbers are 1-based. An added line has no original number, a removed
/// line no proposed number; unchanged and modified lines have both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffLine {
    kind: DiffLineKind,
    original_line_number: Option<usize>,
    proposed_line_number: Option<usize>,
    content: String,
    original_content: Option<String>,
    inline_changes: Vec<InlineChange>,
}

impl DiffLine {
    pub(crate) fn unchanged(original: usize, proposed: usize, content: &str) -> Self {
        Self {
            kind: DiffLineKind::Unchanged,
            original_line_number: Some(original),
            proposed_line_number: Some(proposed),
            content: content.to_string(),
            original_content: None,
            inline_changes: Vec::new(),
        }
    }

    pub(crate) fn added(proposed: usize, content: &str) -> Self {
        Self {
            kind: DiffLineKind::Added,
            original_line_number: None,
            proposed_line_number: Some(proposed),
            content: content.to_string(),
            original_content: None,
            inline_changes: Vec::new(),
        }
    }

    pub(crate) fn removed(original: usize, content: &str) -> Self {
        Self {
            kind: DiffLineKind::Removed,
            original_line_number: Some(original),
            proposed_line_number: None,
            content: content.to_string(),
            original_content: None,
            inline_changes: Vec::new(),
        }
    }

    pub(crate) fn modified(
        original: usize,
        proposed: usize,
        original_content: &str,
        content: &str,
        inline_changes: Vec<InlineChange>,
    ) -> Self {
        Self {
            kind: DiffLineKind::Modified,
            original_line_number: Some(original),
            proposed_line_number: Some(proposed),
            content: content.to_string(),
            original_content: Some(original_content.to_string()),
            inline_changes,
        }
    }

    /// The line kind.
    #[must_use]
    pub const fn kind(&self) -> DiffLineKind {
        self.kind
    }

    /// 1-based line number in the original text.
    #[must_use]
    pub const fn original_line_number(&self) -> Option<usize> {
        self.original_line_number
    }

    /// 1-based line number in the proposed text.
    #[must_use]
    pub const fn proposed_line_number(&self) -> Option<usize> {
        self.proposed_line_number
    }

    /// Display text: the original text for removed lines, the proposed text
    /// otherwise.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The original side's text for modified lines.
    #[must_use]
    pub fn original_content(&self) -> Option<&str> {
        self.original_content.as_deref()
    }

    /// Text this line contributes to the original side, if any.
    #[must_use]
    pub fn original_text(&self) -> Option<&str> {
        match self.kind {
            DiffLineKind::Unchanged | DiffLineKind::Removed => Some(&self.content),
            DiffLineKind::Modified => self.original_content.as_deref(),
            DiffLineKind::Added => None,
        }
    }

    /// Text this line contributes to the proposed side, if any.
    #[must_use]
    pub fn proposed_text(&self) -> Option<&str> {
        match self.kind {
            DiffLineKind::Removed => None,
            _ => Some(&self.content),
        }
    }

    /// Char-level changes, only populated for modified lines.
    #[must_use]
    pub fn inline_changes(&self) -> &[InlineChange] {
        &self.inline_changes
    }
}

/// A contiguous changed region plus surrounding context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffHunk {
    /// Start line in the original text (unified-diff convention).
    pub original_start: usize,
    /// Number of original lines covered.
    pub original_count: usize,
    /// Start line in the proposed text (unified-diff convention).
    pub proposed_start: usize,
    /// Number of proposed lines covered.
    pub proposed_count: usize,
    /// Lines of the hunk, context included.
    pub lines: Vec<DiffLine>,
    /// Nearest enclosing declaration, for display.
    pub context_header: Option<String>,
}

impl DiffHunk {
    /// Renders `@@ -a,b +c,d @@` followed by the context header if present.
    #[must_use]
    pub fn header(&self) -> String {
        let base = format!(
            "@@ -{},{} +{},{} @@",
            self.original_start, self.original_count, self.proposed_start, self.proposed_count
        );
        match &self.context_header {
            Some(context) => format!("{base} {context}"),
            None => base,
        }
    }

    /// Number of non-context lines in the hunk.
    #[must_use]
    pub fn changed_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.kind().is_change()).count()
    }
}

impl fmt::Display for DiffHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// Line counts over a whole comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Added lines.
    pub added: usize,
    /// Removed lines.
    pub removed: usize,
    /// Modified lines.
    pub modified: usize,
    /// Unchanged lines.
    pub unchanged: usize,
}

impl DiffStats {
    pub(crate) fn record(&mut self, kind: DiffLineKind) {
        match kind {
            DiffLineKind::Unchanged => self.unchanged += 1,
            DiffLineKind::Added => self.added += 1,
            DiffLineKind::Removed => self.removed += 1,
            DiffLineKind::Modified => self.modified += 1,
        }
    }

    /// Sum of all four counts.
    #[must_use]
    pub const fn total_lines(&self) -> usize {
        self.added + self.removed + self.modified + self.unchanged
    }

    /// Lines that are not unchanged.
    #[must_use]
    pub const fn changed_lines(&self) -> usize {
        self.added + self.removed + self.modified
    }

    /// Added minus removed.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn net_change(&self) -> isize {
        self.added as isize - self.removed as isize
    }

    /// Changed lines as a percentage of all lines; 0 for an empty comparison.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn change_percentage(&self) -> f64 {
        let total = self.total_lines();
        if total == 0 {
            return 0.0;
        }
        self.changed_lines() as f64 / total as f64 * 100.0
    }
}

/// The outcome of comparing an original text with a proposed one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub(crate) original_content: String,
    pub(crate) proposed_content: String,
    pub(crate) original_file_path: Option<PathBuf>,
    pub(crate) hunks: Vec<DiffHunk>,
    pub(crate) stats: DiffStats,
    pub(crate) is_new_file: bool,
    pub(crate) is_delete_file: bool,
    pub(crate) is_binary_file: bool,
}

impl DiffResult {
    /// Attaches the file path the comparison refers to.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.original_file_path = Some(path.into());
        self
    }

    /// The original text as given.
    #[must_use]
    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    /// The proposed text as given.
    #[must_use]
    pub fn proposed_content(&self) -> &str {
        &self.proposed_content
    }

    /// Path of the compared file, when known.
    #[must_use]
    pub fn original_file_path(&self) -> Option<&Path> {
        self.original_file_path.as_deref()
    }

    /// Hunks in file order.
    #[must_use]
    pub fn hunks(&self) -> &[DiffHunk] {
        &self.hunks
    }

    /// Counts over the full comparison.
    #[must_use]
    pub const fn stats(&self) -> &DiffStats {
        &self.stats
    }

    /// The file does not exist yet.
    #[must_use]
    pub const fn is_new_file(&self) -> bool {
        self.is_new_file
    }

    /// The file is going away.
    #[must_use]
    pub const fn is_delete_file(&self) -> bool {
        self.is_delete_file
    }

    /// One side is binary; no line diff was computed.
    #[must_use]
    pub const fn is_binary_file(&self) -> bool {
        self.is_binary_file
    }

    /// True iff there is at least one hunk, regardless of stats.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.hunks.is_empty()
    }

    /// The original text is non-empty and does not end with a newline.
    #[must_use]
    pub fn original_missing_final_newline(&self) -> bool {
        missing_final_newline(&self.original_content)
    }

    /// The proposed text is non-empty and does not end with a newline.
    #[must_use]
    pub fn proposed_missing_final_newline(&self) -> bool {
        missing_final_newline(&self.proposed_content)
    }

    /// Whether the change can be written as text.
    #[must_use]
    pub const fn is_applicable(&self) -> bool {
        !self.is_binary_file
    }

    /// Rebuilds the proposed text by applying the hunks to the original.
    #[must_use]
    pub fn reconstruct_proposed(&self) -> String {
        let original = split_lines(&self.original_content);
        let lines = self.rebuild(&original, false);
        join_lines(&lines, !self.proposed_missing_final_newline())
    }

    /// Rebuilds the original text by reverting the hunks on the proposed text.
    #[must_use]
    pub fn reconstruct_original(&self) -> String {
        let proposed = split_lines(&self.proposed_content);
        let lines = self.rebuild(&proposed, true);
        join_lines(&lines, !self.original_missing_final_newline())
    }

    fn rebuild<'a>(&'a self, source: &[&'a str], reverse: bool) -> Vec<&'a str> {
        let mut out = Vec::with_capacity(source.len());
        let mut cursor = 0usize;

        for hunk in &self.hunks {
            let (start, count) = if reverse {
                (hunk.proposed_start, hunk.proposed_count)
            } else {
                (hunk.original_start, hunk.original_count)
            };
            // Zero-length sides start *after* the given line.
            let first = if count == 0 { start } else { start - 1 };
            out.extend_from_slice(&source[cursor..first]);
            for line in &hunk.lines {
                let text = if reverse {
                    line.original_text()
                } else {
                    line.proposed_text()
                };
                if let Some(text) = text {
                    out.push(text);
                }
            }
            cursor = first + count;
        }

        out.extend_from_slice(&source[cursor..]);
        out
    }
}

/// Normalizes newlines and splits into lines without terminators.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(text);
    let mut lines = Vec::new();
    let mut rest = body;
    while let Some(pos) = rest.find(|c: char| c == '\n' || c == '\r') {
        lines.push(&rest[..pos]);
        let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + skip..];
    }
    lines.push(rest);
    lines
}

pub(crate) fn missing_final_newline(text: &str) -> bool {
    !(text.is_empty() || text.ends_with('\n') || text.ends_with('\r'))
}

fn join_lines(lines: &[&str], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}
