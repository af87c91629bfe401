//! Completed-step log replayed in reverse when a change has to be undone
//! mid-flight.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::errors::ApplyError;
use crate::vfs::{BackupStore, FileSystem};

/// What a file held before a step touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Prior {
    /// Saved to a backup file.
    Backup(PathBuf),
    /// Held in memory because backups were disabled.
    Snapshot(Vec<u8>),
    /// The file did not exist.
    Absent,
}

/// A step that finished and may need reverting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompletedStep {
    CreatedDirectory(PathBuf),
    /// A directory created earlier in the batch by another operation, which
    /// this one also writes into.
    SharedDirectory(PathBuf),
    BackedUp(PathBuf),
    Wrote { path: PathBuf, prior: Prior },
    Removed { path: PathBuf, prior: Prior },
}

/// Steps of one apply, tagged with the index of the operation they belong to.
#[derive(Debug, Default)]
pub(crate) struct RollbackLog {
    steps: Vec<(usize, CompletedStep)>,
}

impl RollbackLog {
    pub(crate) fn push(&mut self, op: usize, step: CompletedStep) {
        self.steps.push((op, step));
    }

    /// Whether some operation of this batch created `dir`.
    pub(crate) fn created_directory(&self, dir: &Path) -> bool {
        self.steps
            .iter()
            .any(|(_, step)| matches!(step, CompletedStep::CreatedDirectory(d) if d == dir))
    }

    /// Ops with at least one recorded step.
    pub(crate) fn touched(&self, op: usize) -> bool {
        self.steps.iter().any(|(i, _)| *i == op)
    }

    /// Reverts every step, newest first, and returns what could not be
    /// reverted.
    pub(crate) async fn rollback_all(
        &mut self,
        fs: &dyn FileSystem,
        backups: &BackupStore,
    ) -> Vec<ApplyError> {
        let steps = std::mem::take(&mut self.steps);
        revert(steps, fs, backups).await
    }

    /// Reverts only the steps of `op`, newest first.
    pub(crate) async fn rollback_op(
        &mut self,
        op: usize,
        fs: &dyn FileSystem,
        backups: &BackupStore,
    ) -> Vec<ApplyError> {
        let (mut mine, mut rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.steps)
            .into_iter()
            .partition(|(i, _)| *i == op);
        // A directory still shared by another op passes to it.
        mine.retain(|(_, step)| {
            let CompletedStep::CreatedDirectory(dir) = step else {
                return true;
            };
            let heir = rest
                .iter_mut()
                .find(|(_, s)| matches!(s, CompletedStep::SharedDirectory(d) if d == dir));
            match heir {
                Some((heir_op, heir_step)) => {
                    debug!(dir = %dir.display(), op = *heir_op, "Directory handed over");
                    *heir_step = CompletedStep::CreatedDirectory(dir.clone());
                    false
                }
                None => true,
            }
        });
        self.steps = rest;
        revert(mine, fs, backups).await
    }
}

async fn revert(
    steps: Vec<(usize, CompletedStep)>,
    fs: &dyn FileSystem,
    backups: &BackupStore,
) -> Vec<ApplyError> {
    let mut failures = Vec::new();
    for (op, step) in steps.into_iter().rev() {
        debug!(op, ?step, "Reverting step");
        if let Err(e) = revert_step(&step, fs, backups).await {
            warn!(op, error = %e, "Rollback step failed");
            failures.push(e);
        }
    }
    failures
}

async fn revert_step(
    step: &CompletedStep,
    fs: &dyn FileSystem,
    backups: &BackupStore,
) -> Result<(), ApplyError> {
    match step {
        CompletedStep::CreatedDirectory(dir) => fs
            .remove_dir(dir)
            .await
            .map_err(|e| ApplyError::io(dir, &e)),
        CompletedStep::SharedDirectory(_) => Ok(()),
        CompletedStep::BackedUp(backup) => {
            backups.delete_backup(backup).await;
            Ok(())
        }
        CompletedStep::Wrote { path, prior } | CompletedStep::Removed { path, prior } => {
            restore(path, prior, fs, backups).await
        }
    }
}

pub(crate) async fn restore(
    path: &Path,
    prior: &Prior,
    fs: &dyn FileSystem,
    backups: &BackupStore,
) -> Result<(), ApplyError> {
    match prior {
        Prior::Backup(backup) => backups
            .restore_backup(backup, path)
            .await
            .map_err(|e| ApplyError::backup(path, &e)),
        Prior::Snapshot(bytes) => fs
            .write(path, bytes)
            .await
            .map_err(|e| ApplyError::io(path, &e)),
        Prior::Absent => match fs.remove_file(path).await {
            Err(e) if !e.is_not_found() => Err(ApplyError::io(path, &e)),
            _ => Ok(()),
        },
    }
}
