//! Line and character level diffing of whole in-memory texts.
//!
//! [`compute_diff`] turns an original and a proposed text into a
//! [`DiffResult`] of hunks, with similar removed/added lines merged into
//! modified lines that carry inline changes.

pub mod engine;
pub(crate) mod hunks;
pub(crate) mod inline;
pub mod myers;
pub mod options;
pub mod types;
pub mod unified;

// Re-export primary types for convenience
pub use engine::{
    DiffEngine, binary_diff, compute_delete_file_diff, compute_diff, compute_file_diff,
    compute_new_file_diff, is_binary,
};
pub use options::{DiffError, DiffOptions, DiffOptionsBuilder};
pub use types::{
    DiffHunk, DiffLine, DiffLineKind, DiffResult, DiffStats, InlineChange, InlineChangeKind,
};
pub use unified::{NO_NEWLINE_MARKER, render_unified};
