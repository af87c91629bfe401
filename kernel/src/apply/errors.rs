//! Errors raised while applying or undoing file changes.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::vfs::{BackupError, FsError, PolicyError};

/// Errors that can occur during apply and undo operations.
///
/// Errors are plain data so they can be cloned into results and events.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyError {
    /// The operation is not acceptable as given.
    #[error("Validation failed for '{path}': {reason}")]
    Validation {
        /// Path the operation targets.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
    /// The file changed on disk after the diff was computed.
    #[error("Conflict on '{path}': {details}")]
    Conflict {
        /// The conflicting file.
        path: PathBuf,
        /// Description of the difference.
        details: String,
    },
    /// A file system operation failed.
    #[error("I/O error on '{path}': {message}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Creating or restoring a backup failed.
    #[error("Backup failed for '{path}': {message}")]
    Backup {
        /// File being backed up or restored.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
    /// There is no recorded change for the file.
    #[error("Nothing to undo for '{0}'")]
    NothingToUndo(PathBuf),
    /// The backup needed to undo a change is gone.
    #[error("Backup for '{0}' is missing")]
    MissingBackup(PathBuf),
    /// No record has the given id.
    #[error("Change record not found: {0}")]
    RecordNotFound(Uuid),
    /// No record belongs to the given batch.
    #[error("No recorded changes for batch {0}")]
    UnknownBatch(Uuid),
}

impl ApplyError {
    pub(crate) fn validation(path: &Path, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, error: &FsError) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    pub(crate) fn backup(path: &Path, error: &BackupError) -> Self {
        Self::Backup {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    pub(crate) fn policy(path: &Path, error: &PolicyError) -> Self {
        Self::validation(path, error.to_string())
    }

    /// True for [`ApplyError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
