//! Grouping of diff lines into hunks.

use super::options::DiffOptions;
use super::types::{DiffHunk, DiffLine};

const CONTEXT_HEADER_MAX_CHARS: usize = 80;

const DECLARATION_PREFIXES: &[&str] = &[
    "fn ", "pub ", "pub(", "impl", "struct ", "enum ", "trait ", "mod ", "async ", "const fn ",
    "class ", "def ", "function ", "interface ", "func ", "type ", "export ",
];

/// Splits a flat line sequence into hunks with surrounding context.
///
/// Two changed regions share a hunk when the unchanged gap between them is at
/// most the separation threshold, or small enough that their context would
/// overlap.
pub(crate) fn group_hunks(
    lines: &[DiffLine],
    original_lines: &[&str],
    options: &DiffOptions,
) -> Vec<DiffHunk> {
    let context = options.context_lines();
    let merge_gap = options
        .hunk_separation_threshold()
        .max(context.saturating_mul(2));

    let mut clusters: Vec<(usize, usize)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.kind().is_change() {
            continue;
        }
        match clusters.last_mut() {
            Some((_, end)) if i - *end - 1 <= merge_gap => *end = i,
            _ => clusters.push((i, i)),
        }
    }

    // Lines on each side preceding index i.
    let mut original_before = Vec::with_capacity(lines.len() + 1);
    let mut proposed_before = Vec::with_capacity(lines.len() + 1);
    let (mut o, mut p) = (0usize, 0usize);
    for line in lines {
        original_before.push(o);
        proposed_before.push(p);
        o += usize::from(line.original_line_number().is_some());
        p += usize::from(line.proposed_line_number().is_some());
    }
    original_before.push(o);
    proposed_before.push(p);

    clusters
        .into_iter()
        .map(|(first_change, last_change)| {
            let start = first_change.saturating_sub(context);
            let end = (last_change + context).min(lines.len() - 1);

            let original_count = original_before[end + 1] - original_before[start];
            let proposed_count = proposed_before[end + 1] - proposed_before[start];
            let original_start = original_before[start] + usize::from(original_count > 0);
            let proposed_start = proposed_before[start] + usize::from(proposed_count > 0);

            DiffHunk {
                original_start,
                original_count,
                proposed_start,
                proposed_count,
                lines: lines[start..=end].to_vec(),
                context_header: context_header(original_lines, original_before[start]),
            }
        })
        .collect()
}

/// Nearest declaration-looking line above the first `before` original lines.
pub(crate) fn context_header(original_lines: &[&str], before: usize) -> Option<String> {
    original_lines[..before.min(original_lines.len())]
        .iter()
        .rev()
        .find(|line| looks_like_declaration(line))
        .map(|line| line.trim_end().chars().take(CONTEXT_HEADER_MAX_CHARS).collect())
}

fn looks_like_declaration(line: &str) -> bool {
    let Some(first) = line.chars().next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    let trimmed = line.trim_end();
    DECLARATION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || trimmed.ends_with('{')
        || trimmed.ends_with(':')
}
