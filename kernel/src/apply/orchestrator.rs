//! Validated, backed-up, rollback-capable application of file operations,
//! with per-file undo history.
//!
//! A batch runs in phases: validate every operation, create missing parent
//! directories, back up existing files, write, then record history and raise
//! events. Every destructive step is logged before it runs so a halted batch
//! can be replayed in reverse.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::errors::ApplyError;
use super::history::{ChangeHistory, DEFAULT_MAX_RECORDS_PER_FILE};
use super::locks::PathLocks;
use super::rollback::{CompletedStep, Prior, RollbackLog};
use super::types::{
    ApplyOptions, ApplyResult, ApplyStatus, BatchApplyResult, BatchPhase, BatchProgress,
    BatchUndoResult, ChangeType, FileChangeRecord, FileOperation, FileOperationKind,
};
use crate::diff::{DiffEngine, DiffOptions, DiffResult};
use crate::events::{EventBroadcaster, RedlineEvent};
use crate::infrastructure::audit::{AuditEvent, log_audit};
use crate::vfs::{BackupStore, ConflictDetector, FileSystem, WorkspacePolicy};

/// Callback receiving batch progress reports.
pub type ProgressCallback = dyn Fn(BatchProgress) + Send + Sync;

/// Applies file operations and undoes them.
#[derive(Debug)]
pub struct ApplyOrchestrator {
    fs: Arc<dyn FileSystem>,
    backups: Arc<BackupStore>,
    conflicts: ConflictDetector,
    history: ChangeHistory,
    locks: PathLocks,
    events: EventBroadcaster,
}

impl ApplyOrchestrator {
    /// Creates an orchestrator writing through `fs` and backing up into
    /// `backups`.
    pub fn new(fs: Arc<dyn FileSystem>, backups: Arc<BackupStore>) -> Self {
        Self {
            conflicts: ConflictDetector::new(Arc::clone(&fs)),
            fs,
            backups,
            history: ChangeHistory::new(DEFAULT_MAX_RECORDS_PER_FILE),
            locks: PathLocks::default(),
            events: EventBroadcaster::new(),
        }
    }

    /// Publishes events on `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// Keeps at most `max` records per file.
    #[must_use]
    pub fn with_history_limit(mut self, max: usize) -> Self {
        self.history = ChangeHistory::new(max);
        self
    }

    /// The broadcaster events are published on.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The backup store.
    #[must_use]
    pub const fn backups(&self) -> &Arc<BackupStore> {
        &self.backups
    }

    /// Applies a single operation.
    ///
    /// Any failure leaves the file as it was; the reason is in the result.
    #[instrument(skip(self, op, cancel), fields(path = %op.path.display()))]
    pub async fn apply_operation(
        &self,
        op: &FileOperation,
        workspace: &Path,
        options: ApplyOptions,
        cancel: &CancellationToken,
    ) -> ApplyResult {
        let options = ApplyOptions {
            stop_on_error: true,
            ..options
        };
        match self
            .run(std::slice::from_ref(op), workspace, options, None, cancel, None)
            .await
        {
            Ok(outcome) => outcome
                .results
                .into_iter()
                .next()
                .unwrap_or_else(|| ApplyResult::pending(&op.path)),
            Err(error) => {
                warn!(error = %error, "Operation rejected");
                self.events.publish(RedlineEvent::ChangeFailed {
                    path: op.path.clone(),
                    error: error.to_string(),
                });
                ApplyResult {
                    status: ApplyStatus::Failed,
                    error: Some(error),
                    ..ApplyResult::pending(&op.path)
                }
            }
        }
    }

    /// Applies operations in order as one batch.
    ///
    /// With `stop_on_error`, the first failure halts the batch and every
    /// completed step is reverted. Without it, a failing operation is reverted
    /// on its own and the rest continue. Cancellation halts like a failure.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Validation`] for an empty batch or a workspace
    /// that cannot be resolved. Per-operation failures are reported in the
    /// result.
    #[instrument(skip(self, ops, progress, cancel), fields(ops = ops.len()))]
    pub async fn apply_batch(
        &self,
        ops: &[FileOperation],
        workspace: &Path,
        options: ApplyOptions,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<BatchApplyResult, ApplyError> {
        if ops.is_empty() {
            return Err(ApplyError::validation(workspace, "batch contains no operations"));
        }
        let batch_id = Uuid::new_v4();
        let outcome = self
            .run(ops, workspace, options, progress, cancel, Some(batch_id))
            .await?;
        let result = BatchApplyResult::from_results(batch_id, outcome.results, outcome.cancelled);
        info!(
            %batch_id,
            applied = result.applied,
            failed = result.failed,
            rolled_back = result.rolled_back,
            skipped = result.skipped,
            "Batch finished"
        );
        Ok(result)
    }

    async fn run(
        &self,
        ops: &[FileOperation],
        workspace: &Path,
        options: ApplyOptions,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
        batch_id: Option<Uuid>,
    ) -> Result<RunOutcome, ApplyError> {
        let policy =
            WorkspacePolicy::new(workspace).map_err(|e| ApplyError::policy(workspace, &e))?;
        let resolved = resolve_all(&policy, ops);
        let lock_paths: Vec<PathBuf> = resolved.iter().filter_map(|r| r.clone().ok()).collect();
        let _guards = self.locks.acquire(&lock_paths).await;

        let mut batch = BatchRun::new(self, ops, &resolved, options, progress, cancel);
        let Err(halt) = batch.execute(resolved, batch_id).await else {
            return Ok(RunOutcome {
                results: batch.results,
                cancelled: false,
            });
        };

        batch.report(BatchPhase::RollingBack, 0, None);
        let failures = batch.log.rollback_all(self.fs.as_ref(), &self.backups).await;
        let rollback_failures = failures.len() + batch.rollback_failures;
        let cancelled = matches!(halt, Halt::Cancelled);
        for (index, result) in batch.results.iter_mut().enumerate() {
            if result.status == ApplyStatus::Failed {
                continue;
            }
            result.status = if batch.validated[index] {
                ApplyStatus::RolledBack
            } else {
                ApplyStatus::Skipped
            };
            if cancelled {
                result.error = Some(ApplyError::Cancelled);
            }
        }

        let reason = if cancelled {
            info!(rollback_failures, "Apply cancelled, completed steps rolled back");
            "cancelled".to_string()
        } else {
            warn!(rollback_failures, "Apply halted, completed steps rolled back");
            batch
                .results
                .iter()
                .find_map(|r| r.error.as_ref().map(ToString::to_string))
                .unwrap_or_else(|| "operation failed".to_string())
        };
        if let Some(batch_id) = batch_id {
            log_audit(&AuditEvent::BatchRolledBack {
                batch_id,
                reason,
                rollback_failures,
            });
        }

        Ok(RunOutcome {
            results: batch.results,
            cancelled,
        })
    }

    /// Undoes the most recent change to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::NothingToUndo`] if no change is recorded, or the
    /// error that prevented restoring the file.
    #[instrument(skip(self))]
    pub async fn undo_last_change(&self, path: &Path) -> Result<FileChangeRecord, ApplyError> {
        let record = self
            .history
            .latest(&history_key(path))
            .ok_or_else(|| ApplyError::NothingToUndo(path.to_path_buf()))?;
        self.undo_record(record).await
    }

    /// Undoes the change with the given id.
    ///
    /// Only the most recent change to its file can be undone.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::RecordNotFound`] for an unknown id,
    /// [`ApplyError::Validation`] if a newer change to the same file exists,
    /// or the error that prevented restoring the file.
    #[instrument(skip(self))]
    pub async fn undo_change(&self, id: Uuid) -> Result<FileChangeRecord, ApplyError> {
        let record = self.history.find(id).ok_or(ApplyError::RecordNotFound(id))?;
        if self.history.latest(&record.file_path).map(|r| r.id) != Some(id) {
            return Err(ApplyError::validation(
                &record.file_path,
                "a newer change to this file must be undone first",
            ));
        }
        self.undo_record(record).await
    }

    /// Whether the most recent change to `path` can be undone: a created
    /// file, or a change whose backup is still on disk.
    #[must_use]
    pub fn can_undo(&self, path: &Path) -> bool {
        self.history
            .latest(&history_key(path))
            .is_some_and(|record| match &record.backup_path {
                Some(backup) => backup.is_file(),
                None => record.is_undoable(),
            })
    }

    /// Up to `max` records for `path`, newest first.
    #[must_use]
    pub fn get_change_history(&self, path: &Path, max: usize) -> Vec<FileChangeRecord> {
        self.history.for_path(&history_key(path), max)
    }

    /// Every record that can still be undone, newest first.
    #[must_use]
    pub fn get_pending_undos(&self) -> Vec<FileChangeRecord> {
        let mut records = self.history.all();
        records.retain(FileChangeRecord::is_undoable);
        records.reverse();
        records
    }

    /// Undoes every change of a batch in reverse application order.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::UnknownBatch`] if no record belongs to the batch.
    /// Failures of individual undos are reported in the result.
    #[instrument(skip(self))]
    pub async fn undo_batch_apply(&self, batch_id: Uuid) -> Result<BatchUndoResult, ApplyError> {
        let records = self.history.for_batch(batch_id);
        if records.is_empty() {
            return Err(ApplyError::UnknownBatch(batch_id));
        }

        let mut undone = Vec::new();
        let mut failures = Vec::new();
        for record in records.into_iter().rev() {
            match self.undo_record(record.clone()).await {
                Ok(record) => undone.push(record),
                Err(error) => failures.push((record, error)),
            }
        }

        let success = failures.is_empty();
        if success {
            info!(%batch_id, undone = undone.len(), "Batch undone");
        } else {
            warn!(%batch_id, failed = failures.len(), "Batch undo incomplete");
        }
        Ok(BatchUndoResult {
            batch_id,
            success,
            undone,
            failures,
        })
    }

    /// Snapshot of the whole history in application order, for persistence.
    #[must_use]
    pub fn export_history(&self) -> Vec<FileChangeRecord> {
        self.history.all()
    }

    /// Adds previously exported records, skipping ids already present.
    ///
    /// Returns how many were added.
    pub fn import_history(&self, records: impl IntoIterator<Item = FileChangeRecord>) -> usize {
        let mut imported = 0;
        for record in records {
            if self.history.find(record.id).is_some() {
                continue;
            }
            self.history.push(record);
            imported += 1;
        }
        debug!(imported, "History imported");
        imported
    }

    /// Computes the diff `op` would produce against current disk content.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is rejected, the file cannot be read, or
    /// the operation deletes a file that does not exist.
    #[instrument(skip(self, op, options), fields(path = %op.path.display()))]
    pub async fn preview(
        &self,
        op: &FileOperation,
        workspace: &Path,
        options: &DiffOptions,
    ) -> Result<DiffResult, ApplyError> {
        let policy =
            WorkspacePolicy::new(workspace).map_err(|e| ApplyError::policy(workspace, &e))?;
        let path = policy
            .resolve(&op.path)
            .map_err(|e| ApplyError::policy(&op.path, &e))?;
        let current = match self.fs.read_bytes(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(ApplyError::io(&path, &e)),
        };

        let engine = DiffEngine::new(*options);
        match &op.kind {
            FileOperationKind::Write { content } => {
                Ok(engine.file(current.as_deref(), Some(content.as_bytes()), &path))
            }
            FileOperationKind::Delete => match current {
                Some(bytes) => Ok(engine.file(Some(bytes.as_slice()), None, &path)),
                None => Err(ApplyError::validation(&path, "file does not exist")),
            },
        }
    }

    async fn undo_record(&self, record: FileChangeRecord) -> Result<FileChangeRecord, ApplyError> {
        let path = record.file_path.clone();
        let _guards = self.locks.acquire(std::slice::from_ref(&path)).await;

        if let Err(error) = self.revert_record(&record).await {
            warn!(path = %path.display(), error = %error, "Undo failed");
            self.events.publish(RedlineEvent::ChangeFailed {
                path,
                error: error.to_string(),
            });
            return Err(error);
        }

        self.history.remove(record.id);
        if let Some(backup) = &record.backup_path {
            self.backups.delete_backup(backup).await;
        }
        self.events.publish(RedlineEvent::ChangeUndone {
            path: path.clone(),
            record_id: record.id,
        });
        log_audit(&AuditEvent::ChangeUndone {
            record_id: record.id,
            path: path.clone(),
        });
        info!(record_id = %record.id, path = %path.display(), "Change undone");
        Ok(record)
    }

    async fn revert_record(&self, record: &FileChangeRecord) -> Result<(), ApplyError> {
        let path = &record.file_path;
        if self.history.latest(path).map(|r| r.id) != Some(record.id) {
            return Err(ApplyError::RecordNotFound(record.id));
        }
        match record.change_type {
            ChangeType::Created => match self.fs.remove_file(path).await {
                Err(e) if !e.is_not_found() => Err(ApplyError::io(path, &e)),
                _ => Ok(()),
            },
            ChangeType::Modified | ChangeType::Deleted => {
                let backup = record
                    .backup_path
                    .as_ref()
                    .ok_or_else(|| ApplyError::MissingBackup(path.clone()))?;
                if !self.backups.backup_exists(backup).await {
                    return Err(ApplyError::MissingBackup(path.clone()));
                }
                self.backups
                    .restore_backup(backup, path)
                    .await
                    .map_err(|e| ApplyError::backup(path, &e))
            }
        }
    }
}

struct RunOutcome {
    results: Vec<ApplyResult>,
    cancelled: bool,
}

/// Why a batch stopped early.
#[derive(Debug, Clone, Copy)]
enum Halt {
    Failed,
    Cancelled,
}

/// An operation that passed validation.
#[derive(Debug)]
struct Planned<'a> {
    op: &'a FileOperation,
    path: PathBuf,
    existed: bool,
    prior: Prior,
    backup: Option<PathBuf>,
}

impl Planned<'_> {
    fn change_type(&self) -> ChangeType {
        match (&self.op.kind, self.existed) {
            (FileOperationKind::Delete, _) => ChangeType::Deleted,
            (FileOperationKind::Write { .. }, true) => ChangeType::Modified,
            (FileOperationKind::Write { .. }, false) => ChangeType::Created,
        }
    }
}

struct BatchRun<'a> {
    orchestrator: &'a ApplyOrchestrator,
    ops: &'a [FileOperation],
    options: ApplyOptions,
    progress: Option<&'a ProgressCallback>,
    cancel: &'a CancellationToken,
    results: Vec<ApplyResult>,
    planned: Vec<Option<Planned<'a>>>,
    validated: Vec<bool>,
    log: RollbackLog,
    rollback_failures: usize,
}

impl<'a> BatchRun<'a> {
    fn new(
        orchestrator: &'a ApplyOrchestrator,
        ops: &'a [FileOperation],
        resolved: &[Result<PathBuf, ApplyError>],
        options: ApplyOptions,
        progress: Option<&'a ProgressCallback>,
        cancel: &'a CancellationToken,
    ) -> Self {
        let results = ops
            .iter()
            .zip(resolved)
            .map(|(op, path)| ApplyResult::pending(path.as_ref().unwrap_or(&op.path)))
            .collect();
        Self {
            orchestrator,
            ops,
            options,
            progress,
            cancel,
            results,
            planned: ops.iter().map(|_| None).collect(),
            validated: vec![false; ops.len()],
            log: RollbackLog::default(),
            rollback_failures: 0,
        }
    }

    async fn execute(
        &mut self,
        resolved: Vec<Result<PathBuf, ApplyError>>,
        batch_id: Option<Uuid>,
    ) -> Result<(), Halt> {
        self.validate(resolved).await?;
        self.run_phase(BatchPhase::CreatingDirectories).await?;
        self.run_phase(BatchPhase::BackingUp).await?;
        self.run_phase(BatchPhase::Writing).await?;
        self.finalize(batch_id)
    }

    fn report(&self, phase: BatchPhase, completed: usize, path: Option<&Path>) {
        if let Some(progress) = self.progress {
            progress(BatchProgress {
                phase,
                completed,
                total: self.ops.len(),
                path: path.map(Path::to_path_buf),
            });
        }
    }

    fn check_cancelled(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn active(&self) -> Vec<usize> {
        (0..self.planned.len())
            .filter(|&i| self.planned[i].is_some())
            .collect()
    }

    async fn validate(&mut self, resolved: Vec<Result<PathBuf, ApplyError>>) -> Result<(), Halt> {
        debug!("Validating operations");
        let ops = self.ops;
        for (index, (op, path)) in ops.iter().zip(resolved).enumerate() {
            self.check_cancelled()?;
            match self.validate_one(op, path).await {
                Ok(planned) => {
                    self.validated[index] = true;
                    self.planned[index] = Some(planned);
                }
                Err(error) => self.fail(index, error).await?,
            }
            self.report(BatchPhase::Validating, index + 1, Some(&self.results[index].path));
        }
        Ok(())
    }

    async fn validate_one(
        &self,
        op: &'a FileOperation,
        path: Result<PathBuf, ApplyError>,
    ) -> Result<Planned<'a>, ApplyError> {
        let path = path?;
        let existed = self.orchestrator.fs.exists(&path).await;
        if matches!(op.kind, FileOperationKind::Delete) && !existed {
            return Err(ApplyError::validation(&path, "file does not exist"));
        }

        if let Some(expected) = &op.expected_original {
            let check = self
                .orchestrator
                .conflicts
                .detect_conflict(&path, expected)
                .await
                .map_err(|e| ApplyError::io(&path, &e))?;
            if check.has_conflict {
                if !self.options.overwrite_on_conflict {
                    return Err(ApplyError::Conflict {
                        path,
                        details: check.summary(),
                    });
                }
                warn!(path = %path.display(), details = %check.summary(), "Overwriting conflicting file");
            }
        }

        Ok(Planned {
            op,
            path,
            existed,
            prior: Prior::Absent,
            backup: None,
        })
    }

    async fn run_phase(&mut self, phase: BatchPhase) -> Result<(), Halt> {
        debug!(?phase, "Starting phase");
        for (done, index) in self.active().into_iter().enumerate() {
            self.check_cancelled()?;
            let step = match phase {
                BatchPhase::CreatingDirectories => self.create_parents(index).await,
                BatchPhase::BackingUp => self.capture_prior(index).await,
                _ => self.write(index).await,
            };
            if let Err(error) = step {
                self.fail(index, error).await?;
            }
            self.report(phase, done + 1, Some(&self.results[index].path));
        }
        Ok(())
    }

    async fn create_parents(&mut self, index: usize) -> Result<(), ApplyError> {
        let Some(planned) = &self.planned[index] else {
            return Ok(());
        };
        if matches!(planned.op.kind, FileOperationKind::Delete) {
            return Ok(());
        }
        let fs = self.orchestrator.fs.as_ref();
        let mut missing = Vec::new();
        let mut shared = Vec::new();
        for dir in planned.path.ancestors().skip(1) {
            if self.log.created_directory(dir) {
                shared.push(dir.to_path_buf());
            } else if fs.exists(dir).await {
                break;
            } else {
                missing.push(dir.to_path_buf());
            }
        }
        for dir in shared.into_iter().rev() {
            self.log.push(index, CompletedStep::SharedDirectory(dir));
        }
        for dir in missing.into_iter().rev() {
            fs.create_dir_all(&dir)
                .await
                .map_err(|e| ApplyError::io(&dir, &e))?;
            debug!(dir = %dir.display(), "Directory created");
            self.log.push(index, CompletedStep::CreatedDirectory(dir));
        }
        Ok(())
    }

    async fn capture_prior(&mut self, index: usize) -> Result<(), ApplyError> {
        let Some(planned) = self.planned[index].as_mut() else {
            return Ok(());
        };
        if !planned.existed {
            return Ok(());
        }
        let path = planned.path.clone();
        if self.options.create_backup {
            let backup = self
                .orchestrator
                .backups
                .create_backup(&path)
                .await
                .map_err(|e| ApplyError::backup(&path, &e))?
                .ok_or_else(|| ApplyError::validation(&path, "file disappeared before backup"))?;
            self.log.push(index, CompletedStep::BackedUp(backup.clone()));
            planned.prior = Prior::Backup(backup.clone());
            planned.backup = Some(backup);
        } else {
            let bytes = self
                .orchestrator
                .fs
                .read_bytes(&path)
                .await
                .map_err(|e| ApplyError::io(&path, &e))?;
            planned.prior = Prior::Snapshot(bytes);
        }
        Ok(())
    }

    async fn write(&mut self, index: usize) -> Result<(), ApplyError> {
        let Some(planned) = &self.planned[index] else {
            return Ok(());
        };
        let fs = self.orchestrator.fs.as_ref();
        let path = planned.path.clone();
        match &planned.op.kind {
            FileOperationKind::Write { content } => {
                self.log.push(
                    index,
                    CompletedStep::Wrote {
                        path: path.clone(),
                        prior: planned.prior.clone(),
                    },
                );
                fs.write(&path, content.as_bytes())
                    .await
                    .map_err(|e| ApplyError::io(&path, &e))?;
            }
            FileOperationKind::Delete => {
                self.log.push(
                    index,
                    CompletedStep::Removed {
                        path: path.clone(),
                        prior: planned.prior.clone(),
                    },
                );
                fs.remove_file(&path)
                    .await
                    .map_err(|e| ApplyError::io(&path, &e))?;
            }
        }
        debug!(path = %path.display(), "Operation written");
        Ok(())
    }

    /// Records the failure; halts under `stop_on_error`, otherwise reverts
    /// just this operation.
    async fn fail(&mut self, index: usize, error: ApplyError) -> Result<(), Halt> {
        let path = self.results[index].path.clone();
        let events = &self.orchestrator.events;
        if let ApplyError::Conflict { details, .. } = &error {
            warn!(path = %path.display(), details = %details, "Conflict detected");
            events.publish(RedlineEvent::ConflictDetected {
                path,
                details: details.clone(),
            });
        } else {
            warn!(path = %path.display(), error = %error, "Operation failed");
            events.publish(RedlineEvent::ChangeFailed {
                path,
                error: error.to_string(),
            });
        }

        let result = &mut self.results[index];
        result.status = ApplyStatus::Failed;
        result.error = Some(error);
        self.planned[index] = None;

        if self.options.stop_on_error {
            return Err(Halt::Failed);
        }
        if self.log.touched(index) {
            let fs = self.orchestrator.fs.as_ref();
            let failures = self
                .log
                .rollback_op(index, fs, &self.orchestrator.backups)
                .await;
            self.rollback_failures += failures.len();
        }
        Ok(())
    }

    fn finalize(&mut self, batch_id: Option<Uuid>) -> Result<(), Halt> {
        self.check_cancelled()?;
        let orchestrator = self.orchestrator;
        for (done, index) in self.active().into_iter().enumerate() {
            let Some(planned) = self.planned[index].take() else {
                continue;
            };
            let change_type = planned.change_type();
            let record = FileChangeRecord {
                id: Uuid::new_v4(),
                file_path: planned.path.clone(),
                original_content_available: planned.backup.is_some(),
                backup_path: planned.backup,
                change_type,
                timestamp: Utc::now(),
                batch_id,
            };
            // Without a backup the change cannot be reverted, so it stays out
            // of history and older records remain undoable.
            if record.is_undoable() {
                orchestrator.history.push(record.clone());
            } else {
                debug!(path = %record.file_path.display(), "No backup taken, change not undoable");
            }
            orchestrator.events.publish(RedlineEvent::FileChanged {
                path: record.file_path.clone(),
                change_type: record.change_type,
                record_id: record.id,
            });
            log_audit(&AuditEvent::ChangeApplied {
                record_id: record.id,
                path: record.file_path.clone(),
                change_type: record.change_type,
                batch_id,
            });
            info!(
                record_id = %record.id,
                path = %record.file_path.display(),
                change_type = ?record.change_type,
                "Change applied"
            );

            let result = &mut self.results[index];
            result.status = ApplyStatus::Applied;
            result.success = true;
            result.records = vec![record];
            self.report(BatchPhase::Finalizing, done + 1, Some(&planned.path));
        }
        Ok(())
    }
}

/// Resolves every path; later duplicates of a resolved path are rejected.
fn resolve_all(policy: &WorkspacePolicy, ops: &[FileOperation]) -> Vec<Result<PathBuf, ApplyError>> {
    let mut seen = HashSet::new();
    ops.iter()
        .map(|op| {
            let path = policy
                .resolve(&op.path)
                .map_err(|e| ApplyError::policy(&op.path, &e))?;
            if seen.insert(path.clone()) {
                Ok(path)
            } else {
                Err(ApplyError::validation(
                    &path,
                    "path appears more than once in the batch",
                ))
            }
        })
        .collect()
}

/// Canonical form of `path` as stored in history, tolerating a file that no
/// longer exists.
fn history_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => dunce::canonicalize(parent)
            .map_or_else(|_| path.to_path_buf(), |parent| parent.join(name)),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::LocalFileSystem;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    fn setup() -> anyhow::Result<(TempDir, ApplyOrchestrator)> {
        let dir = tempdir()?;
        std::fs::create_dir(dir.path().join("ws"))?;
        let backups = Arc::new(BackupStore::new(dir.path().join("backups")));
        let orchestrator = ApplyOrchestrator::new(Arc::new(LocalFileSystem::new()), backups);
        Ok((dir, orchestrator))
    }

    #[tokio::test]
    async fn test_modify_then_undo_restores_bytes() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        let target = ws.join("notes.txt");
        std::fs::write(&target, "line one\r\nline two\n")?;

        let result = orchestrator
            .apply_operation(
                &FileOperation::write("notes.txt", "rewritten\n"),
                &ws,
                ApplyOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.records[0].change_type, ChangeType::Modified);
        assert!(result.records[0].original_content_available);
        assert_eq!(std::fs::read_to_string(&target)?, "rewritten\n");
        assert!(orchestrator.can_undo(&target));

        let undone = orchestrator.undo_last_change(&target).await?;
        assert_eq!(undone.id, result.records[0].id);
        assert_eq!(std::fs::read(&target)?, b"line one\r\nline two\n");
        assert!(!orchestrator.can_undo(&target));
        assert!(!undone.backup_path.expect("backup").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_created_file_undo_deletes_it() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");

        let result = orchestrator
            .apply_operation(
                &FileOperation::write("deep/nested/new.rs", "fn main() {}\n"),
                &ws,
                ApplyOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.success);
        let record = &result.records[0];
        assert_eq!(record.change_type, ChangeType::Created);
        assert!(record.backup_path.is_none());
        assert!(!record.original_content_available);

        orchestrator.undo_change(record.id).await?;
        assert!(!ws.join("deep/nested/new.rs").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_of_missing_file_is_validation_error() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let result = orchestrator
            .apply_operation(
                &FileOperation::delete("absent.txt"),
                &dir.path().join("ws"),
                ApplyOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, ApplyStatus::Failed);
        assert!(matches!(result.error, Some(ApplyError::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_blocks_write_unless_overwriting() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        let target = ws.join("a.txt");
        std::fs::write(&target, "edited elsewhere\n")?;
        let mut events = orchestrator.events().subscribe();

        let op = FileOperation::write("a.txt", "mine\n").with_expected_original("original\n");
        let result = orchestrator
            .apply_operation(&op, &ws, ApplyOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result.error, Some(ApplyError::Conflict { .. })));
        assert_eq!(std::fs::read_to_string(&target)?, "edited elsewhere\n");
        assert!(
            events
                .drain()
                .iter()
                .any(|e| matches!(e, RedlineEvent::ConflictDetected { .. }))
        );

        let overwrite = ApplyOptions {
            overwrite_on_conflict: true,
            ..ApplyOptions::default()
        };
        let result = orchestrator
            .apply_operation(&op, &ws, overwrite, &CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&target)?, "mine\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_without_backups_snapshot_still_rolls_back() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        std::fs::write(ws.join("keep.txt"), "keep\n")?;

        let options = ApplyOptions {
            create_backup: false,
            ..ApplyOptions::default()
        };
        // The second write fails because its parent is a regular file.
        let ops = [
            FileOperation::write("keep.txt", "changed\n"),
            FileOperation::write("keep.txt/child.txt", "never\n"),
        ];
        let result = orchestrator
            .apply_batch(&ops, &ws, options, None, &CancellationToken::new())
            .await?;
        assert!(!result.success);
        assert_eq!(result.results[0].status, ApplyStatus::RolledBack);
        assert_eq!(result.results[1].status, ApplyStatus::Failed);
        assert!(matches!(result.results[1].error, Some(ApplyError::Io { .. })));
        assert_eq!(std::fs::read_to_string(ws.join("keep.txt"))?, "keep\n");
        assert!(!orchestrator.backups().directory().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_undo_change_requires_latest_record() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        let cancel = CancellationToken::new();
        let first = orchestrator
            .apply_operation(&FileOperation::write("f.txt", "1\n"), &ws, ApplyOptions::default(), &cancel)
            .await;
        orchestrator
            .apply_operation(&FileOperation::write("f.txt", "2\n"), &ws, ApplyOptions::default(), &cancel)
            .await;

        let err = orchestrator.undo_change(first.records[0].id).await.unwrap_err();
        assert!(matches!(err, ApplyError::Validation { .. }));
        assert!(matches!(
            orchestrator.undo_change(Uuid::new_v4()).await,
            Err(ApplyError::RecordNotFound(_))
        ));
        assert_eq!(orchestrator.get_change_history(&ws.join("f.txt"), 10).len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_progress_reports_each_phase() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        let phases = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&phases);
        let callback = move |p: BatchProgress| sink.lock().expect("lock").push(p.phase);

        let ops = [
            FileOperation::write("a.txt", "a\n"),
            FileOperation::write("b.txt", "b\n"),
        ];
        let result = orchestrator
            .apply_batch(&ops, &ws, ApplyOptions::default(), Some(&callback), &CancellationToken::new())
            .await?;
        assert!(result.success);

        let phases = std::mem::take(&mut *phases.lock().expect("lock"));
        assert_eq!(phases.len(), 10);
        assert_eq!(phases.first(), Some(&BatchPhase::Validating));
        assert_eq!(phases.last(), Some(&BatchPhase::Finalizing));
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_and_history_round_trip() -> anyhow::Result<()> {
        let (dir, orchestrator) = setup()?;
        let ws = dir.path().join("ws");
        std::fs::write(ws.join("p.txt"), "a\nb\n")?;

        let diff = orchestrator
            .preview(&FileOperation::write("p.txt", "a\nc\n"), &ws, &DiffOptions::default())
            .await?;
        assert_eq!(diff.stats().modified, 1);
        let gone = orchestrator
            .preview(&FileOperation::delete("p.txt"), &ws, &DiffOptions::default())
            .await?;
        assert!(gone.is_delete_file());

        orchestrator
            .apply_operation(&FileOperation::write("p.txt", "a\nc\n"), &ws, ApplyOptions::default(), &CancellationToken::new())
            .await;
        let exported = orchestrator.export_history();
        let json = serde_json::to_string(&exported)?;
        let records: Vec<FileChangeRecord> = serde_json::from_str(&json)?;

        let (_other_dir, fresh) = setup()?;
        assert_eq!(fresh.import_history(records.clone()), 1);
        assert_eq!(fresh.import_history(records), 0);
        assert_eq!(fresh.get_pending_undos(), exported);
        Ok(())
    }
}
