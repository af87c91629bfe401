//! Integration tests for transactional apply and undo.

use async_trait::async_trait;
use redline_kernel::apply::{
    ApplyError, ApplyOptions, ApplyOrchestrator, ApplyStatus, BatchPhase, BatchProgress,
    ChangeType, FileOperation,
};
use redline_kernel::events::RedlineEvent;
use redline_kernel::vfs::{BackupStore, FileSystem, FsError, LocalFileSystem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// =============================================================================
// Fixtures
// =============================================================================

/// Local file system whose writes fail for one file name.
#[derive(Debug)]
struct FailingWrites {
    inner: LocalFileSystem,
    fail_on: &'static str,
}

#[async_trait]
impl FileSystem for FailingWrites {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        self.inner.read_to_string(path).await
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.inner.read_bytes(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        if path.file_name().is_some_and(|n| n == self.fail_on) {
            return Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.write(path, contents).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.inner.remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.remove_dir(path).await
    }
}

struct Fixture {
    _dir: TempDir,
    workspace: PathBuf,
    backups: PathBuf,
}

impl Fixture {
    fn new() -> anyhow::Result<Self> {
        let dir = tempdir()?;
        let workspace = dir.path().join("workspace");
        std::fs::create_dir(&workspace)?;
        let backups = dir.path().join("backups");
        Ok(Self {
            _dir: dir,
            workspace,
            backups,
        })
    }

    fn orchestrator(&self) -> ApplyOrchestrator {
        self.orchestrator_with(Arc::new(LocalFileSystem::new()))
    }

    fn orchestrator_with(&self, fs: Arc<dyn FileSystem>) -> ApplyOrchestrator {
        ApplyOrchestrator::new(fs, Arc::new(BackupStore::new(&self.backups)))
    }

    fn write(&self, relative: &str, content: &str) -> anyhow::Result<()> {
        let path = self.workspace.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.workspace.join(relative)).ok()
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.workspace.join(relative)
    }
}

fn statuses(result: &redline_kernel::apply::BatchApplyResult) -> Vec<ApplyStatus> {
    result.results.iter().map(|r| r.status).collect()
}

// =============================================================================
// Apply and undo
// =============================================================================

#[tokio::test]
async fn test_apply_then_undo_restores_exact_bytes() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let original = "first line\r\nsecond line\n\ttabbed   \nno newline at end";
    fx.write("src/main.rs", original)?;
    let orchestrator = fx.orchestrator();

    let result = orchestrator
        .apply_operation(
            &FileOperation::write("src/main.rs", "replaced\n").with_expected_original(original),
            &fx.workspace,
            ApplyOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(fx.read("src/main.rs").as_deref(), Some("replaced\n"));
    assert!(orchestrator.can_undo(&fx.path("src/main.rs")));

    orchestrator.undo_last_change(&fx.path("src/main.rs")).await?;
    assert_eq!(std::fs::read(fx.path("src/main.rs"))?, original.as_bytes());
    assert!(!orchestrator.can_undo(&fx.path("src/main.rs")));
    assert!(matches!(
        orchestrator.undo_last_change(&fx.path("src/main.rs")).await,
        Err(ApplyError::NothingToUndo(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_delete_then_undo_brings_file_back() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("old.txt", "keep me\n")?;
    let orchestrator = fx.orchestrator();
    let mut events = orchestrator.events().subscribe();

    let result = orchestrator
        .apply_operation(
            &FileOperation::delete("old.txt"),
            &fx.workspace,
            ApplyOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.success);
    assert_eq!(result.records[0].change_type, ChangeType::Deleted);
    assert!(fx.read("old.txt").is_none());

    orchestrator.undo_change(result.records[0].id).await?;
    assert_eq!(fx.read("old.txt").as_deref(), Some("keep me\n"));

    let events = events.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        RedlineEvent::FileChanged { change_type: ChangeType::Deleted, .. }
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RedlineEvent::ChangeUndone { record_id, .. } if *record_id == result.records[0].id))
    );
    Ok(())
}

#[tokio::test]
async fn test_undo_fails_when_backup_is_gone() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("a.txt", "one\n")?;
    let orchestrator = fx.orchestrator();

    let result = orchestrator
        .apply_operation(
            &FileOperation::write("a.txt", "two\n"),
            &fx.workspace,
            ApplyOptions::default(),
            &CancellationToken::new(),
        )
        .await;
    let backup = result.records[0].backup_path.clone().expect("backup taken");
    std::fs::remove_file(backup)?;

    let err = orchestrator.undo_last_change(&fx.path("a.txt")).await.unwrap_err();
    assert!(matches!(err, ApplyError::MissingBackup(_)));
    assert_eq!(fx.read("a.txt").as_deref(), Some("two\n"));
    assert!(!orchestrator.can_undo(&fx.path("a.txt")));
    Ok(())
}

#[tokio::test]
async fn test_change_without_backup_is_not_undoable() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("a.txt", "old\n")?;
    let orchestrator = fx.orchestrator();
    let cancel = CancellationToken::new();

    let backed_up = orchestrator
        .apply_operation(
            &FileOperation::write("a.txt", "mid\n"),
            &fx.workspace,
            ApplyOptions::default(),
            &cancel,
        )
        .await;
    assert!(backed_up.success);

    let no_backup = ApplyOptions {
        create_backup: false,
        ..ApplyOptions::default()
    };
    let result = orchestrator
        .apply_operation(&FileOperation::write("a.txt", "new\n"), &fx.workspace, no_backup, &cancel)
        .await;
    assert!(result.success, "{:?}", result.error);
    let record = &result.records[0];
    assert_eq!(record.change_type, ChangeType::Modified);
    assert!(record.backup_path.is_none());
    assert!(!record.original_content_available);

    // Only the backed-up change is on record.
    let history = orchestrator.get_change_history(&fx.path("a.txt"), 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, backed_up.records[0].id);
    assert!(orchestrator.get_pending_undos().iter().all(|r| r.id != record.id));
    assert!(matches!(
        orchestrator.undo_change(record.id).await,
        Err(ApplyError::RecordNotFound(_))
    ));

    assert!(orchestrator.can_undo(&fx.path("a.txt")));
    orchestrator.undo_last_change(&fx.path("a.txt")).await?;
    assert_eq!(fx.read("a.txt").as_deref(), Some("old\n"));
    assert!(!orchestrator.can_undo(&fx.path("a.txt")));
    Ok(())
}

#[tokio::test]
async fn test_delete_without_backup_leaves_nothing_to_undo() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("gone.txt", "bye\n")?;
    let orchestrator = fx.orchestrator();
    let options = ApplyOptions {
        create_backup: false,
        ..ApplyOptions::default()
    };

    let result = orchestrator
        .apply_operation(&FileOperation::delete("gone.txt"), &fx.workspace, options, &CancellationToken::new())
        .await;
    assert!(result.success);
    assert!(!orchestrator.can_undo(&fx.path("gone.txt")));
    assert!(matches!(
        orchestrator.undo_last_change(&fx.path("gone.txt")).await,
        Err(ApplyError::NothingToUndo(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_path_traversal_is_rejected() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = fx.orchestrator();

    for bad in ["../escape.txt", "a/../../escape.txt", "nul\0byte.txt", ""] {
        let result = orchestrator
            .apply_operation(
                &FileOperation::write(bad, "x"),
                &fx.workspace,
                ApplyOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, ApplyStatus::Failed, "{bad:?}");
        assert!(matches!(result.error, Some(ApplyError::Validation { .. })));
    }
    assert!(!fx.workspace.parent().unwrap().join("escape.txt").exists());
    Ok(())
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_batch_with_invalid_operation_changes_nothing() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("existing.txt", "untouched\n")?;
    let orchestrator = fx.orchestrator();

    let ops = [
        FileOperation::write("existing.txt", "changed\n"),
        FileOperation::write("../outside.txt", "nope\n"),
        FileOperation::write("created.txt", "new\n"),
    ];
    let result = orchestrator
        .apply_batch(
            &ops,
            &fx.workspace,
            ApplyOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await?;

    assert!(!result.success);
    assert_eq!(
        statuses(&result),
        vec![ApplyStatus::RolledBack, ApplyStatus::Failed, ApplyStatus::Skipped]
    );
    assert_eq!((result.rolled_back, result.failed, result.skipped), (1, 1, 1));
    assert_eq!(fx.read("existing.txt").as_deref(), Some("untouched\n"));
    assert!(fx.read("created.txt").is_none());
    assert!(orchestrator.get_pending_undos().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_write_failure_rolls_back_completed_steps() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("modified.txt", "before\n")?;
    let orchestrator = fx.orchestrator_with(Arc::new(FailingWrites {
        inner: LocalFileSystem::new(),
        fail_on: "broken.txt",
    }));
    let mut events = orchestrator.events().subscribe();

    let ops = [
        FileOperation::write("modified.txt", "after\n"),
        FileOperation::write("fresh/dir/created.txt", "hello\n"),
        FileOperation::write("broken.txt", "never\n"),
    ];
    let result = orchestrator
        .apply_batch(
            &ops,
            &fx.workspace,
            ApplyOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        statuses(&result),
        vec![ApplyStatus::RolledBack, ApplyStatus::RolledBack, ApplyStatus::Failed]
    );
    assert!(matches!(result.results[2].error, Some(ApplyError::Io { .. })));
    assert_eq!(fx.read("modified.txt").as_deref(), Some("before\n"));
    assert!(!fx.path("fresh").exists());
    assert!(fx.read("broken.txt").is_none());
    assert!(
        events
            .drain()
            .iter()
            .any(|e| matches!(e, RedlineEvent::ChangeFailed { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_batch_continues_past_failures_when_asked() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = fx.orchestrator_with(Arc::new(FailingWrites {
        inner: LocalFileSystem::new(),
        fail_on: "broken.txt",
    }));

    let options = ApplyOptions {
        stop_on_error: false,
        ..ApplyOptions::default()
    };
    let ops = [
        FileOperation::write("one.txt", "1\n"),
        FileOperation::write("nested/broken.txt", "x\n"),
        FileOperation::delete("missing.txt"),
        FileOperation::write("two.txt", "2\n"),
    ];
    let result = orchestrator
        .apply_batch(&ops, &fx.workspace, options, None, &CancellationToken::new())
        .await?;

    assert_eq!(
        statuses(&result),
        vec![
            ApplyStatus::Applied,
            ApplyStatus::Failed,
            ApplyStatus::Failed,
            ApplyStatus::Applied
        ]
    );
    assert_eq!(result.applied, 2);
    assert!(!result.success);
    assert_eq!(fx.read("one.txt").as_deref(), Some("1\n"));
    assert_eq!(fx.read("two.txt").as_deref(), Some("2\n"));
    assert!(!fx.path("nested").exists());
    assert_eq!(result.records().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_op_keeps_directory_another_op_writes_into() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = fx.orchestrator_with(Arc::new(FailingWrites {
        inner: LocalFileSystem::new(),
        fail_on: "broken.txt",
    }));

    let options = ApplyOptions {
        stop_on_error: false,
        ..ApplyOptions::default()
    };
    // The first op creates `shared/`, then fails its write.
    let ops = [
        FileOperation::write("shared/broken.txt", "x\n"),
        FileOperation::write("shared/ok.txt", "ok\n"),
    ];
    let result = orchestrator
        .apply_batch(&ops, &fx.workspace, options, None, &CancellationToken::new())
        .await?;

    assert_eq!(
        statuses(&result),
        vec![ApplyStatus::Failed, ApplyStatus::Applied]
    );
    assert!(result.results[1].error.is_none());
    assert_eq!(fx.read("shared/ok.txt").as_deref(), Some("ok\n"));
    assert!(fx.read("shared/broken.txt").is_none());
    assert_eq!(result.records().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_paths_in_batch_are_rejected() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = fx.orchestrator();
    let ops = [
        FileOperation::write("same.txt", "a\n"),
        FileOperation::write("./same.txt", "b\n"),
    ];
    let result = orchestrator
        .apply_batch(
            &ops,
            &fx.workspace,
            ApplyOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(statuses(&result), vec![ApplyStatus::RolledBack, ApplyStatus::Failed]);
    assert!(fx.read("same.txt").is_none());

    let empty = orchestrator
        .apply_batch(
            &[],
            &fx.workspace,
            ApplyOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(empty, Err(ApplyError::Validation { .. })));
    Ok(())
}

#[tokio::test]
async fn test_undo_batch_reverts_every_change() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("lib.rs", "pub fn old() {}\n")?;
    let orchestrator = fx.orchestrator();

    let ops = [
        FileOperation::write("lib.rs", "pub fn new() {}\n"),
        FileOperation::write("tests/new_test.rs", "#[test]\nfn t() {}\n"),
    ];
    let applied = orchestrator
        .apply_batch(
            &ops,
            &fx.workspace,
            ApplyOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await?;
    assert!(applied.success);
    assert!(
        applied
            .records()
            .iter()
            .all(|r| r.batch_id == Some(applied.batch_id))
    );

    let undone = orchestrator.undo_batch_apply(applied.batch_id).await?;
    assert!(undone.success);
    assert_eq!(undone.undone.len(), 2);
    assert_eq!(undone.undone[0].change_type, ChangeType::Created);
    assert_eq!(fx.read("lib.rs").as_deref(), Some("pub fn old() {}\n"));
    assert!(fx.read("tests/new_test.rs").is_none());

    assert!(matches!(
        orchestrator.undo_batch_apply(applied.batch_id).await,
        Err(ApplyError::UnknownBatch(_))
    ));
    assert!(matches!(
        orchestrator.undo_batch_apply(Uuid::new_v4()).await,
        Err(ApplyError::UnknownBatch(_))
    ));
    Ok(())
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_before_start_touches_nothing() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = fx.orchestrator();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let ops = [
        FileOperation::write("a.txt", "a\n"),
        FileOperation::write("b.txt", "b\n"),
    ];
    let result = orchestrator
        .apply_batch(&ops, &fx.workspace, ApplyOptions::default(), None, &cancel)
        .await?;

    assert!(result.cancelled);
    assert!(!result.success);
    assert_eq!(statuses(&result), vec![ApplyStatus::Skipped, ApplyStatus::Skipped]);
    assert!(
        result
            .results
            .iter()
            .all(|r| r.error.as_ref().is_some_and(ApplyError::is_cancelled))
    );
    assert!(fx.read("a.txt").is_none());
    Ok(())
}

#[tokio::test]
async fn test_cancel_mid_write_rolls_back() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("a.txt", "original a\n")?;
    let orchestrator = fx.orchestrator();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let progress = move |p: BatchProgress| {
        if p.phase == BatchPhase::Writing && p.completed == 1 {
            trigger.cancel();
        }
    };
    let ops = [
        FileOperation::write("a.txt", "new a\n"),
        FileOperation::write("b.txt", "new b\n"),
    ];
    let result = orchestrator
        .apply_batch(
            &ops,
            &fx.workspace,
            ApplyOptions::default(),
            Some(&progress),
            &cancel,
        )
        .await?;

    assert!(result.cancelled);
    assert_eq!(statuses(&result), vec![ApplyStatus::RolledBack, ApplyStatus::RolledBack]);
    assert_eq!(fx.read("a.txt").as_deref(), Some("original a\n"));
    assert!(fx.read("b.txt").is_none());
    assert!(!orchestrator.can_undo(&fx.path("a.txt")));
    Ok(())
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_evicts_oldest_records() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    fx.write("f.txt", "v0\n")?;
    let orchestrator = fx.orchestrator().with_history_limit(2);
    let cancel = CancellationToken::new();

    for version in 1..=3 {
        let result = orchestrator
            .apply_operation(
                &FileOperation::write("f.txt", format!("v{version}\n")),
                &fx.workspace,
                ApplyOptions::default(),
                &cancel,
            )
            .await;
        assert!(result.success);
    }

    let history = orchestrator.get_change_history(&fx.path("f.txt"), 10);
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp >= history[1].timestamp);
    assert_eq!(orchestrator.get_change_history(&fx.path("f.txt"), 1).len(), 1);

    orchestrator.undo_last_change(&fx.path("f.txt")).await?;
    assert_eq!(fx.read("f.txt").as_deref(), Some("v2\n"));
    orchestrator.undo_last_change(&fx.path("f.txt")).await?;
    assert_eq!(fx.read("f.txt").as_deref(), Some("v1\n"));
    assert!(!orchestrator.can_undo(&fx.path("f.txt")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_applies_to_one_file_are_serialized() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let orchestrator = Arc::new(fx.orchestrator());

    let mut handles = Vec::new();
    for i in 0..8 {
        let orchestrator = Arc::clone(&orchestrator);
        let workspace = fx.workspace.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .apply_operation(
                    &FileOperation::write("shared.txt", format!("writer {i}\n")),
                    &workspace,
                    ApplyOptions::default(),
                    &CancellationToken::new(),
                )
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await?.success);
    }

    let history = orchestrator.get_change_history(&fx.path("shared.txt"), 100);
    assert_eq!(history.len(), 8);
    assert_eq!(
        history
            .iter()
            .filter(|r| r.change_type == ChangeType::Created)
            .count(),
        1
    );
    Ok(())
}
