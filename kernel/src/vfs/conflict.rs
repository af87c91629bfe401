//! Detection of files that changed on disk after a diff was computed.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::diff::{DiffOptions, DiffResult, compute_diff, compute_new_file_diff};
use crate::vfs::fs::{FileSystem, FsError};
use crate::vfs::hashing::content_hash;

/// How the caller wants to handle a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Write the proposed content anyway.
    Overwrite,
    /// Recompute the diff against what is on disk now.
    Rediff,
    /// Give up on the change.
    Abort,
}

/// Outcome of comparing expected content against the current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCheckResult {
    /// The current content differs from the expected content, or is missing.
    pub has_conflict: bool,
    /// The file no longer exists.
    pub file_missing: bool,
    /// SHA-256 of the expected content.
    pub expected_hash: String,
    /// SHA-256 of the current content, if the file exists.
    pub current_hash: Option<String>,
    /// The content the diff was computed against.
    pub expected_content: String,
    /// The content on disk now, if the file exists.
    pub current_content: Option<String>,
}

impl ConflictCheckResult {
    /// Recomputes the diff from the current content to `proposed`.
    ///
    /// A missing file yields a new-file diff.
    #[must_use]
    pub fn rediff(&self, proposed: &str, options: &DiffOptions) -> DiffResult {
        match &self.current_content {
            Some(current) => compute_diff(current, proposed, options),
            None => compute_new_file_diff(proposed, options),
        }
    }

    /// One-line description for events and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.file_missing {
            return "file was deleted since the diff was computed".to_string();
        }
        match &self.current_hash {
            Some(current) if self.has_conflict => format!(
                "content changed since the diff was computed (expected {}, found {})",
                short(&self.expected_hash),
                short(current)
            ),
            _ => "no conflict".to_string(),
        }
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

/// Compares `expected` with `current`; `None` means the file is missing.
///
/// Any byte difference is a conflict, line endings included.
#[must_use]
pub fn check(expected: &str, current: Option<&str>) -> ConflictCheckResult {
    let expected_hash = content_hash(expected.as_bytes());
    let current_hash = current.map(|c| content_hash(c.as_bytes()));
    ConflictCheckResult {
        has_conflict: current_hash.as_deref() != Some(expected_hash.as_str()),
        file_missing: current.is_none(),
        expected_hash,
        current_hash,
        expected_content: expected.to_string(),
        current_content: current.map(str::to_string),
    }
}

/// Reads current file content and checks it against expectations.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    fs: Arc<dyn FileSystem>,
}

impl ConflictDetector {
    /// Creates a detector reading through `fs`.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Checks whether the file at `path` still holds `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read. A missing file
    /// is reported as a conflict, not an error.
    #[instrument(skip(self, expected))]
    pub async fn detect_conflict(
        &self,
        path: &Path,
        expected: &str,
    ) -> Result<ConflictCheckResult, FsError> {
        let current = match self.fs.read_bytes(path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let result = check(expected, current.as_deref());
        debug!(
            has_conflict = result.has_conflict,
            file_missing = result.file_missing,
            "Conflict check complete"
        );
        Ok(result)
    }
}
