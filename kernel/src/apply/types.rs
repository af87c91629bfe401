//! Data types for apply and undo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::errors::ApplyError;

/// What a change did to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The file did not exist before.
    Created,
    /// Existing content was replaced.
    Modified,
    /// The file was removed.
    Deleted,
}

/// One applied change, kept for undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    /// Unique id of the change.
    pub id: Uuid,
    /// Absolute path of the changed file.
    pub file_path: PathBuf,
    /// Copy of the content before the change, if one was taken.
    pub backup_path: Option<PathBuf>,
    /// Kind of change.
    pub change_type: ChangeType,
    /// When the change was applied.
    pub timestamp: DateTime<Utc>,
    /// Whether the previous content can be restored.
    pub original_content_available: bool,
    /// Batch the change was applied in, if any.
    pub batch_id: Option<Uuid>,
}

impl FileChangeRecord {
    /// Whether the record carries what an undo needs: nothing for a created
    /// file, a backup otherwise.
    #[must_use]
    pub fn is_undoable(&self) -> bool {
        match self.change_type {
            ChangeType::Created => true,
            ChangeType::Modified | ChangeType::Deleted => self.backup_path.is_some(),
        }
    }
}

/// Options for a single apply or a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Back up existing files before touching them (default: true).
    pub create_backup: bool,
    /// Write even if the file changed since the diff was computed (default: false).
    pub overwrite_on_conflict: bool,
    /// Halt and roll back the batch on the first failure (default: true).
    pub stop_on_error: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            overwrite_on_conflict: false,
            stop_on_error: true,
        }
    }
}

/// What an operation does to its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileOperationKind {
    /// Replace or create the file with `content`.
    Write {
        /// The new content.
        content: String,
    },
    /// Remove the file.
    Delete,
}

/// A requested change to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Workspace-relative path, or absolute path inside the workspace.
    pub path: PathBuf,
    /// What to do.
    pub kind: FileOperationKind,
    /// Content the change was previewed against; checked for conflicts.
    pub expected_original: Option<String>,
}

impl FileOperation {
    /// Writes `content` to `path`.
    pub fn write(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileOperationKind::Write {
                content: content.into(),
            },
            expected_original: None,
        }
    }

    /// Deletes `path`.
    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileOperationKind::Delete,
            expected_original: None,
        }
    }

    /// Requires the file to still hold `expected` when applied.
    #[must_use]
    pub fn with_expected_original(mut self, expected: impl Into<String>) -> Self {
        self.expected_original = Some(expected.into());
        self
    }
}

/// Outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// Written and recorded.
    Applied,
    /// This operation failed.
    Failed,
    /// Completed work was reverted because the batch halted.
    RolledBack,
    /// Never attempted.
    Skipped,
}

/// Result of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    /// Resolved target path, or the requested path if it did not resolve.
    pub path: PathBuf,
    /// True only for [`ApplyStatus::Applied`].
    pub success: bool,
    /// Final status.
    pub status: ApplyStatus,
    /// Why the operation did not apply.
    pub error: Option<ApplyError>,
    /// Records produced.
    pub records: Vec<FileChangeRecord>,
}

impl ApplyResult {
    pub(crate) fn pending(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            status: ApplyStatus::Skipped,
            error: None,
            records: Vec::new(),
        }
    }
}

/// Result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchApplyResult {
    /// Id shared by every record of the batch.
    pub batch_id: Uuid,
    /// Every operation applied.
    pub success: bool,
    /// One result per operation, in input order.
    pub results: Vec<ApplyResult>,
    /// Operations applied.
    pub applied: usize,
    /// Operations failed.
    pub failed: usize,
    /// Operations never attempted.
    pub skipped: usize,
    /// Operations reverted.
    pub rolled_back: usize,
    /// The batch stopped because of cancellation.
    pub cancelled: bool,
}

impl BatchApplyResult {
    pub(crate) fn from_results(batch_id: Uuid, results: Vec<ApplyResult>, cancelled: bool) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        let applied = count(ApplyStatus::Applied);
        let failed = count(ApplyStatus::Failed);
        let skipped = count(ApplyStatus::Skipped);
        let rolled_back = count(ApplyStatus::RolledBack);
        Self {
            batch_id,
            success: applied == results.len() && !cancelled,
            results,
            applied,
            failed,
            skipped,
            rolled_back,
            cancelled,
        }
    }

    /// Records of every applied operation.
    #[must_use]
    pub fn records(&self) -> Vec<&FileChangeRecord> {
        self.results.iter().flat_map(|r| &r.records).collect()
    }
}

/// Phase a batch is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Checking paths, existence and conflicts.
    Validating,
    /// Creating missing parent directories.
    CreatingDirectories,
    /// Backing up existing files.
    BackingUp,
    /// Writing and deleting files.
    Writing,
    /// Recording history and raising events.
    Finalizing,
    /// Reverting completed steps.
    RollingBack,
}

/// Progress report passed to the batch progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// Current phase.
    pub phase: BatchPhase,
    /// Operations finished in this phase.
    pub completed: usize,
    /// Operations in the batch.
    pub total: usize,
    /// Operation being worked on.
    pub path: Option<PathBuf>,
}

/// Result of undoing a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchUndoResult {
    /// The batch.
    pub batch_id: Uuid,
    /// Every record was undone.
    pub success: bool,
    /// Records undone, in undo order.
    pub undone: Vec<FileChangeRecord>,
    /// Records that could not be undone, with the reason.
    pub failures: Vec<(FileChangeRecord, ApplyError)>,
}
