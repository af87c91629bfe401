//! Line-level diff computation.

use std::path::Path;

use tracing::{debug, instrument};

use super::hunks::group_hunks;
use super::inline::{inline_changes, similarity};
use super::myers::{EditOp, compute_ses};
use super::options::DiffOptions;
use super::types::{DiffLine, DiffResult, DiffStats, missing_final_newline, split_lines};

/// Removed/added runs are paired positionally up to this many pairs.
pub const PAIR_WINDOW: usize = 64;

/// Pairs below this similarity stay a separate removal and addition.
pub const MODIFIED_PAIR_MIN_SIMILARITY: f64 = 0.2;

/// Bytes inspected for a NUL when sniffing binary content.
pub const BINARY_SNIFF_LEN: usize = 8000;

/// Stateless diff engine bound to one set of options.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    /// Creates an engine using `options` for every comparison.
    #[must_use]
    pub const fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// The options in use.
    #[must_use]
    pub const fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// See [`compute_diff`].
    #[must_use]
    pub fn compute(&self, original: &str, proposed: &str) -> DiffResult {
        compute_diff(original, proposed, &self.options)
    }

    /// See [`compute_new_file_diff`].
    #[must_use]
    pub fn new_file(&self, content: &str) -> DiffResult {
        compute_new_file_diff(content, &self.options)
    }

    /// See [`compute_delete_file_diff`].
    #[must_use]
    pub fn delete_file(&self, content: &str) -> DiffResult {
        compute_delete_file_diff(content, &self.options)
    }

    /// See [`compute_file_diff`].
    #[must_use]
    pub fn file(&self, original: Option<&[u8]>, proposed: Option<&[u8]>, path: &Path) -> DiffResult {
        compute_file_diff(original, proposed, path, &self.options)
    }
}

/// Compares two texts line by line.
///
/// Identical inputs produce no hunks. Removed and added runs are paired into
/// modified lines when they are similar enough, and modified lines carry
/// inline changes when enabled by `options`.
#[must_use]
#[instrument(level = "trace", skip_all, fields(original_len = original.len(), proposed_len = proposed.len()))]
pub fn compute_diff(original: &str, proposed: &str, options: &DiffOptions) -> DiffResult {
    let original_lines = split_lines(original);
    let proposed_lines = split_lines(proposed);

    let mut old_keys: Vec<String> = original_lines
        .iter()
        .map(|l| options.comparison_key(l))
        .collect();
    let mut new_keys: Vec<String> = proposed_lines
        .iter()
        .map(|l| options.comparison_key(l))
        .collect();
    // A last line without its terminator never matches one that has it.
    mark_unterminated(&mut old_keys, original);
    mark_unterminated(&mut new_keys, proposed);
    let ses = compute_ses(&old_keys, &new_keys);

    let mut lines = Vec::with_capacity(ses.len());
    let mut removed_run: Vec<usize> = Vec::new();
    let mut added_run: Vec<usize> = Vec::new();
    let (mut oi, mut ni) = (0usize, 0usize);

    for op in ses {
        match op {
            EditOp::Keep => {
                flush_run(
                    &mut removed_run,
                    &mut added_run,
                    &original_lines,
                    &proposed_lines,
                    options,
                    &mut lines,
                );
                lines.push(DiffLine::unchanged(oi + 1, ni + 1, proposed_lines[ni]));
                oi += 1;
                ni += 1;
            }
            EditOp::Delete => {
                removed_run.push(oi);
                oi += 1;
            }
            EditOp::Insert => {
                added_run.push(ni);
                ni += 1;
            }
        }
    }
    flush_run(
        &mut removed_run,
        &mut added_run,
        &original_lines,
        &proposed_lines,
        options,
        &mut lines,
    );

    let result = finish(original, proposed, &lines, &original_lines, options);
    debug!(
        hunks = result.hunks.len(),
        added = result.stats.added,
        removed = result.stats.removed,
        modified = result.stats.modified,
        "Diff computed"
    );
    result
}

fn mark_unterminated(keys: &mut [String], text: &str) {
    if missing_final_newline(text)
        && let Some(last) = keys.last_mut()
    {
        last.push('\n');
    }
}

/// Emits a run of removals and additions found between two kept lines.
fn flush_run(
    removed: &mut Vec<usize>,
    added: &mut Vec<usize>,
    original_lines: &[&str],
    proposed_lines: &[&str],
    options: &DiffOptions,
    out: &mut Vec<DiffLine>,
) {
    let limit = options.max_inline_diff_line_length();
    for i in 0..removed.len().max(added.len()) {
        let r = removed.get(i).copied();
        let a = added.get(i).copied();

        if let (Some(r), Some(a)) = (r, a)
            && i < PAIR_WINDOW
        {
            let (old, new) = (original_lines[r], proposed_lines[a]);
            let score = similarity(old, new, limit);
            if score >= MODIFIED_PAIR_MIN_SIMILARITY {
                let inline = if options.compute_inline_diffs()
                    && score >= options.inline_diff_similarity_threshold()
                    && old.chars().count() <= limit
                    && new.chars().count() <= limit
                {
                    inline_changes(old, new)
                } else {
                    Vec::new()
                };
                out.push(DiffLine::modified(r + 1, a + 1, old, new, inline));
                continue;
            }
        }

        if let Some(r) = r {
            out.push(DiffLine::removed(r + 1, original_lines[r]));
        }
        if let Some(a) = a {
            out.push(DiffLine::added(a + 1, proposed_lines[a]));
        }
    }
    removed.clear();
    added.clear();
}

fn finish(
    original: &str,
    proposed: &str,
    lines: &[DiffLine],
    original_lines: &[&str],
    options: &DiffOptions,
) -> DiffResult {
    let mut stats = DiffStats::default();
    for line in lines {
        stats.record(line.kind());
    }
    let hunks = if stats.changed_lines() == 0 {
        Vec::new()
    } else {
        group_hunks(lines, original_lines, options)
    };

    DiffResult {
        original_content: original.to_string(),
        proposed_content: proposed.to_string(),
        original_file_path: None,
        hunks,
        stats,
        is_new_file: false,
        is_delete_file: false,
        is_binary_file: false,
    }
}

/// Diff for a file that does not exist yet: every line is added.
#[must_use]
pub fn compute_new_file_diff(content: &str, options: &DiffOptions) -> DiffResult {
    let proposed_lines = split_lines(content);
    let lines: Vec<DiffLine> = proposed_lines
        .iter()
        .enumerate()
        .map(|(i, l)| DiffLine::added(i + 1, l))
        .collect();
    let mut result = finish("", content, &lines, &[], options);
    result.is_new_file = true;
    result
}

/// Diff for a file being removed: every line is removed.
#[must_use]
pub fn compute_delete_file_diff(content: &str, options: &DiffOptions) -> DiffResult {
    let original_lines = split_lines(content);
    let lines: Vec<DiffLine> = original_lines
        .iter()
        .enumerate()
        .map(|(i, l)| DiffLine::removed(i + 1, l))
        .collect();
    let mut result = finish(content, "", &lines, &original_lines, options);
    result.is_delete_file = true;
    result
}

/// Placeholder result for binary content; no line diff is attempted.
#[must_use]
pub fn binary_diff(path: &Path) -> DiffResult {
    DiffResult {
        original_content: String::new(),
        proposed_content: String::new(),
        original_file_path: Some(path.to_path_buf()),
        hunks: Vec::new(),
        stats: DiffStats::default(),
        is_new_file: false,
        is_delete_file: false,
        is_binary_file: true,
    }
}

/// True when `bytes` has a NUL in its first [`BINARY_SNIFF_LEN`] bytes or is
/// not valid UTF-8.
#[must_use]
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) || std::str::from_utf8(bytes).is_err()
}

/// Compares raw file contents, where `None` means the file is absent.
///
/// Binary content on either side yields [`binary_diff`].
#[must_use]
pub fn compute_file_diff(
    original: Option<&[u8]>,
    proposed: Option<&[u8]>,
    path: &Path,
    options: &DiffOptions,
) -> DiffResult {
    if original.is_some_and(is_binary) || proposed.is_some_and(is_binary) {
        debug!(path = %path.display(), "Binary content, skipping line diff");
        return binary_diff(path);
    }
    let as_text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();

    let result = match (original.map(as_text), proposed.map(as_text)) {
        (Some(old), Some(new)) => compute_diff(&old, &new, options),
        (None, Some(new)) => compute_new_file_diff(&new, options),
        (Some(old), None) => compute_delete_file_diff(&old, options),
        (None, None) => compute_diff("", "", options),
    };
    result.with_path(path)
}
