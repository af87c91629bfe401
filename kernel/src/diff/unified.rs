//! Unified diff rendering (similar to `diff -u`).

use std::fmt::Write as _;

use super::types::{DiffLineKind, DiffResult, split_lines};

/// Follows the last line of a side that has no final newline.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Formats a diff result as a unified diff string.
///
/// Modified lines render as a removal of the original text followed by an
/// addition of the proposed text. A result without hunks renders headers only,
/// and binary results render a single `Binary files differ` line. The last
/// line of a side without a final newline is followed by
/// [`NO_NEWLINE_MARKER`].
///
/// # Arguments
///
/// * `result` - The diff to render.
/// * `old_label` - Label for the `---` header.
/// * `new_label` - Label for the `+++` header.
#[must_use]
pub fn render_unified(result: &DiffResult, old_label: &str, new_label: &str) -> String {
    let mut output = String::new();

    if result.is_binary_file() {
        let _ = writeln!(output, "Binary files {old_label} and {new_label} differ");
        return output;
    }

    let _ = writeln!(output, "--- {old_label}");
    let _ = writeln!(output, "+++ {new_label}");

    let original_last = result
        .original_missing_final_newline()
        .then(|| split_lines(result.original_content()).len());
    let proposed_last = result
        .proposed_missing_final_newline()
        .then(|| split_lines(result.proposed_content()).len());
    let marker = |output: &mut String, last: Option<usize>, number: Option<usize>| {
        if last.is_some() && last == number {
            let _ = writeln!(output, "{NO_NEWLINE_MARKER}");
        }
    };

    for hunk in result.hunks() {
        let _ = writeln!(output, "{}", hunk.header());
        for line in &hunk.lines {
            let old_number = line.original_line_number();
            let new_number = line.proposed_line_number();
            match line.kind() {
                DiffLineKind::Unchanged => {
                    let _ = writeln!(output, " {}", line.content());
                    marker(&mut output, original_last, old_number);
                }
                DiffLineKind::Added => {
                    let _ = writeln!(output, "+{}", line.content());
                    marker(&mut output, proposed_last, new_number);
                }
                DiffLineKind::Removed => {
                    let _ = writeln!(output, "-{}", line.content());
                    marker(&mut output, original_last, old_number);
                }
                DiffLineKind::Modified => {
                    let original = line.original_content().unwrap_or_default();
                    let _ = writeln!(output, "-{original}");
                    marker(&mut output, original_last, old_number);
                    let _ = writeln!(output, "+{}", line.content());
                    marker(&mut output, proposed_last, new_number);
                }
            }
        }
    }

    output
}
