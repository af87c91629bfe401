//! Timestamped backup copies of files about to be overwritten or deleted.
//!
//! Backups are plain byte copies named
//! `<file_name>.<YYYYMMDDTHHMMSS.fff>.<8 hex>.bak` inside a single backup
//! directory. They are reflinked when the file system supports it.

use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::infrastructure::audit::{AuditEvent, log_audit};
use crate::vfs::reflink::copy_file_reflink;

const BACKUP_EXTENSION: &str = "bak";

/// Errors raised while creating or restoring backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory could not be created.
    #[error("Failed to create backup directory '{path}': {source}")]
    CreateDirectory {
        /// The backup directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Copying the source into the backup directory failed.
    #[error("Failed to back up '{path}': {source}")]
    Copy {
        /// File being backed up.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Copying a backup back to its target failed.
    #[error("Failed to restore '{backup}' to '{target}': {source}")]
    Restore {
        /// The backup file.
        backup: PathBuf,
        /// Where it was being restored to.
        target: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The backup file does not exist.
    #[error("Backup not found: {0}")]
    NotFound(PathBuf),
    /// The source path has no file name.
    #[error("Cannot back up '{0}': path has no file name")]
    InvalidSource(PathBuf),
    /// A blocking copy task panicked or was cancelled.
    #[error("Backup task failed: {0}")]
    Task(String),
}

/// Creates, restores and prunes backup copies in one directory on the local
/// disk, whatever [`FileSystem`](crate::vfs::FileSystem) the workspace uses.
#[derive(Debug, Clone)]
pub struct BackupStore {
    directory: PathBuf,
}

impl BackupStore {
    /// Creates a store rooted at `directory`; the directory is created lazily.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The backup directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Copies `source` into the backup directory.
    ///
    /// Returns `Ok(None)` when `source` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup directory cannot be created or the copy
    /// fails.
    #[instrument(skip(self))]
    pub async fn create_backup(&self, source: &Path) -> Result<Option<PathBuf>, BackupError> {
        match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(BackupError::InvalidSource(source.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Nothing to back up");
                return Ok(None);
            }
            Err(e) => {
                return Err(BackupError::Copy {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        }

        let name = source
            .file_name()
            .ok_or_else(|| BackupError::InvalidSource(source.to_path_buf()))?
            .to_string_lossy()
            .into_owned();

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| BackupError::CreateDirectory {
                path: self.directory.clone(),
                source: e,
            })?;

        let backup = self.directory.join(backup_file_name(&name));
        let (src, dst) = (source.to_path_buf(), backup.clone());
        tokio::task::spawn_blocking(move || copy_file_reflink(&src, &dst))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?
            .map_err(|e| BackupError::Copy {
                path: source.to_path_buf(),
                source: e,
            })?;

        debug!(backup = %backup.display(), "Backup created");
        Ok(Some(backup))
    }

    /// Copies `backup` over `target`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] if the backup is gone, or an error if
    /// the copy fails.
    #[instrument(skip(self))]
    pub async fn restore_backup(&self, backup: &Path, target: &Path) -> Result<(), BackupError> {
        if !self.backup_exists(backup).await {
            return Err(BackupError::NotFound(backup.to_path_buf()));
        }
        let restore_err = |source| BackupError::Restore {
            backup: backup.to_path_buf(),
            target: target.to_path_buf(),
            source,
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(restore_err)?;
        }
        tokio::fs::copy(backup, target).await.map_err(restore_err)?;
        debug!("Backup restored");
        Ok(())
    }

    /// Removes a backup; failures are logged and reported as `false`.
    pub async fn delete_backup(&self, backup: &Path) -> bool {
        match tokio::fs::remove_file(backup).await {
            Ok(()) => true,
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "Failed to delete backup");
                false
            }
        }
    }

    /// Whether the backup file exists.
    pub async fn backup_exists(&self, backup: &Path) -> bool {
        tokio::fs::metadata(backup)
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Removes `.bak` files older than `max_age` and returns how many went.
    ///
    /// Unreadable entries and failed removals are logged and skipped.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self, max_age: Duration) -> usize {
        let directory = self.directory.clone();
        let removed =
            tokio::task::spawn_blocking(move || prune_directory(&directory, max_age)).await;
        match removed {
            Ok(count) => {
                if count > 0 {
                    info!(removed = count, "Expired backups pruned");
                    log_audit(&AuditEvent::BackupsPruned { removed: count });
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "Backup cleanup task failed");
                0
            }
        }
    }

    /// Runs [`cleanup_expired`](Self::cleanup_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Backup cleanup task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.cleanup_expired(max_age).await;
                    }
                }
            }
        })
    }
}

fn backup_file_name(name: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{name}.{stamp}.{}.{BACKUP_EXTENSION}", &suffix[..8])
}

fn prune_directory(directory: &Path, max_age: Duration) -> usize {
    if !directory.exists() {
        return 0;
    }
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Failed to read backup directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXTENSION)
        {
            continue;
        }
        let expired = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .is_some_and(|modified| modified < cutoff);
        if !expired {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(backup = %path.display(), error = %e, "Failed to prune backup"),
        }
    }
    removed
}
