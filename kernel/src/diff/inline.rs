//! Line similarity and character-level inline changes.
//!
//! Similarity is the Ratcliff/Obershelp style ratio `2 * LCS / (len_a + len_b)`
//! over chars, with the LCS taken from the Myers edit script. Lines longer than
//! the inline limit are compared by whitespace-separated tokens instead so a
//! minified line cannot make pairing quadratic.

use super::myers::{EditOp, compute_ses};
use super::types::{InlineChange, InlineChangeKind};

/// Ratio of matching elements between two sequences, in `0.0..=1.0`.
#[allow(clippy::cast_precision_loss)]
fn ratio<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let keeps = compute_ses(a, b)
        .iter()
        .filter(|op| **op == EditOp::Keep)
        .count();
    (2 * keeps) as f64 / total as f64
}

/// Similarity of two lines; chars up to `char_limit`, tokens beyond it.
pub(crate) fn similarity(a: &str, b: &str, char_limit: usize) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.len() <= char_limit && b_chars.len() <= char_limit {
        return ratio(&a_chars, &b_chars);
    }
    let a_tokens: Vec<&str> = a.split_whitespace().collect();
    let b_tokens: Vec<&str> = b.split_whitespace().collect();
    ratio(&a_tokens, &b_tokens)
}

/// Char-level changes between an original and a proposed line.
///
/// Removed segments carry columns in the original line; Added and Unchanged
/// segments carry columns in the proposed line. Adjacent segments of the same
/// kind are coalesced.
pub(crate) fn inline_changes(original: &str, proposed: &str) -> Vec<InlineChange> {
    let old: Vec<char> = original.chars().collect();
    let new: Vec<char> = proposed.chars().collect();
    let ses = compute_ses(&old, &new);

    let mut changes: Vec<InlineChange> = Vec::new();
    let (mut oi, mut ni) = (0usize, 0usize);

    for op in ses {
        let (kind, ch, column) = match op {
            EditOp::Keep => {
                let item = (InlineChangeKind::Unchanged, new[ni], ni);
                oi += 1;
                ni += 1;
                item
            }
            EditOp::Delete => {
                let item = (InlineChangeKind::Removed, old[oi], oi);
                oi += 1;
                item
            }
            EditOp::Insert => {
                let item = (InlineChangeKind::Added, new[ni], ni);
                ni += 1;
                item
            }
        };

        match changes.last_mut() {
            Some(last) if last.kind == kind && last.end_column() == column => {
                last.text.push(ch);
                last.length += 1;
            }
            _ => changes.push(InlineChange {
                kind,
                start_column: column,
                length: 1,
                text: ch.to_string(),
            }),
        }
    }

    changes
}
