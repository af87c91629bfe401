//! Debounced, revision-guarded diff recomputation for streamed content.
//!
//! Every content change bumps a block's revision. Computations capture the
//! revision they were started for and only publish if it is still the newest
//! one, so a slow computation can never overwrite a newer result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, TokioClock};
use super::state::{BlockId, ComputationStatus, ContentBlock, DiffComputationState};
use crate::diff::{DiffEngine, DiffOptions, DiffResult};
use crate::events::{EventBroadcaster, RedlineEvent};
use crate::vfs::fs::{FileSystem, FsError};
use crate::vfs::policy::{PolicyError, WorkspacePolicy};

/// Default quiet period before recomputing a changed block.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Errors surfaced by [`StreamingDiffCoordinator::finalize`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Reading the original file failed.
    #[error("Failed to read original content of '{path}': {source}")]
    Read {
        /// The file being diffed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: FsError,
    },
    /// The block's file path is not allowed inside the workspace.
    #[error("Rejected path '{path}': {source}")]
    Policy {
        /// The path as given by the block.
        path: PathBuf,
        /// Why the policy rejected it.
        #[source]
        source: PolicyError,
    },
    /// The diff computation task panicked or was aborted.
    #[error("Diff computation task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
struct BlockEntry {
    state: DiffComputationState,
    task: Option<JoinHandle<()>>,
}

impl BlockEntry {
    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug)]
struct Inner {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    engine: DiffEngine,
    debounce: Duration,
    events: EventBroadcaster,
    blocks: Mutex<HashMap<BlockId, BlockEntry>>,
}

/// Builder for [`StreamingDiffCoordinator`].
#[derive(Debug)]
pub struct CoordinatorBuilder {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    options: DiffOptions,
    debounce: Duration,
    events: EventBroadcaster,
}

impl CoordinatorBuilder {
    /// Uses `clock` for debounce delays.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the diff options.
    #[must_use]
    pub fn options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the debounce quiet period.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Publishes events through `events`.
    #[must_use]
    pub fn events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// Builds the coordinator.
    #[must_use]
    pub fn build(self) -> StreamingDiffCoordinator {
        StreamingDiffCoordinator {
            inner: Arc::new(Inner {
                fs: self.fs,
                clock: self.clock,
                engine: DiffEngine::new(self.options),
                debounce: self.debounce,
                events: self.events,
                blocks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Tracks one computation state per content block and keeps its diff current.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct StreamingDiffCoordinator {
    inner: Arc<Inner>,
}

impl StreamingDiffCoordinator {
    /// Starts a builder reading original content through `fs`.
    pub fn builder(fs: Arc<dyn FileSystem>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            fs,
            clock: Arc::new(TokioClock),
            options: DiffOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
            events: EventBroadcaster::new(),
        }
    }

    /// The broadcaster events are published on.
    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Registers a block and computes its first diff right away.
    #[instrument(skip(self, block), fields(block_id = %block.block_id))]
    pub fn on_content_detected(&self, block: &ContentBlock, workspace: &Path) {
        let revision = self.bump(block, ComputationStatus::Detected);
        let inner = Arc::clone(&self.inner);
        let (block_owned, workspace) = (block.clone(), workspace.to_path_buf());
        let task = tokio::spawn(async move {
            let _ = run_computation(&inner, &block_owned, &workspace, revision).await;
        });
        self.store_task(&block.block_id, revision, task);
    }

    /// Records new content and restarts the debounce window.
    ///
    /// Any previous computation for the block is aborted, whether it is
    /// still waiting out its window or already reading.
    #[instrument(skip(self, block), fields(block_id = %block.block_id))]
    pub fn on_content_updated(&self, block: &ContentBlock, workspace: &Path) {
        let revision = self.bump(block, ComputationStatus::Debouncing);
        let inner = Arc::clone(&self.inner);
        let (block_owned, workspace) = (block.clone(), workspace.to_path_buf());
        let task = tokio::spawn(async move {
            inner.clock.sleep(inner.debounce).await;
            let _ = run_computation(&inner, &block_owned, &workspace, revision).await;
        });
        self.store_task(&block.block_id, revision, task);
    }

    /// Cancels any pending window and computes the final diff inline.
    ///
    /// # Errors
    ///
    /// Returns an error if the file path leaves the workspace, the original
    /// file cannot be read or the computation task fails. The block is marked
    /// `Failed` in that case.
    #[instrument(skip(self, block), fields(block_id = %block.block_id))]
    pub async fn finalize(
        &self,
        block: &ContentBlock,
        workspace: &Path,
    ) -> Result<Arc<DiffResult>, CoordinatorError> {
        let revision = self.bump(block, ComputationStatus::Computing);
        run_computation(&self.inner, block, workspace, revision).await
    }

    /// Snapshot of one block's state.
    #[must_use]
    pub fn get_state(&self, block_id: &BlockId) -> Option<DiffComputationState> {
        self.inner
            .blocks
            .lock()
            .get(block_id)
            .map(|entry| entry.state.clone())
    }

    /// Snapshots of every block, ordered by id.
    #[must_use]
    pub fn get_all_states(&self) -> Vec<DiffComputationState> {
        let mut states: Vec<_> = self
            .inner
            .blocks
            .lock()
            .values()
            .map(|entry| entry.state.clone())
            .collect();
        states.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        states
    }

    /// Cancels work for a block; returns false if the block is unknown.
    ///
    /// Any computation still running for it will not publish.
    pub fn cancel(&self, block_id: &BlockId) -> bool {
        let cancelled = {
            let mut blocks = self.inner.blocks.lock();
            match blocks.get_mut(block_id) {
                Some(entry) => {
                    cancel_entry(entry);
                    true
                }
                None => false,
            }
        };
        if cancelled {
            debug!(%block_id, "Block cancelled");
            self.inner.events.publish(RedlineEvent::StatusChanged {
                block_id: block_id.clone(),
                status: ComputationStatus::Cancelled,
            });
        }
        cancelled
    }

    /// Cancels every block.
    pub fn cancel_all(&self) {
        let ids: Vec<BlockId> = self.inner.blocks.lock().keys().cloned().collect();
        for id in &ids {
            self.cancel(id);
        }
    }

    /// Cancels every block and forgets all state.
    pub fn reset(&self) {
        let mut blocks = self.inner.blocks.lock();
        for entry in blocks.values_mut() {
            entry.abort_task();
        }
        blocks.clear();
        debug!("Coordinator reset");
    }

    /// Bumps the revision and moves the block to `status`, aborting the
    /// previous task.
    fn bump(&self, block: &ContentBlock, status: ComputationStatus) -> u64 {
        let revision = {
            let mut blocks = self.inner.blocks.lock();
            let entry = blocks
                .entry(block.block_id.clone())
                .or_insert_with(|| BlockEntry {
                    state: DiffComputationState::new(
                        block.block_id.clone(),
                        block.file_path.clone(),
                    ),
                    task: None,
                });
            entry.abort_task();
            entry.state.revision += 1;
            entry.state.file_path.clone_from(&block.file_path);
            entry.state.set_status(status);
            entry.state.revision
        };
        debug!(revision, ?status, "Block revision bumped");
        self.inner.events.publish(RedlineEvent::StatusChanged {
            block_id: block.block_id.clone(),
            status,
        });
        revision
    }

    fn store_task(&self, block_id: &BlockId, revision: u64, task: JoinHandle<()>) {
        let mut blocks = self.inner.blocks.lock();
        match blocks.get_mut(block_id) {
            Some(entry) if entry.state.revision == revision => entry.task = Some(task),
            // Superseded or reset in the meantime.
            _ => task.abort(),
        }
    }
}

fn cancel_entry(entry: &mut BlockEntry) {
    entry.abort_task();
    entry.state.revision += 1;
    entry.state.set_status(ComputationStatus::Cancelled);
}

/// Reads the original file, computes the diff and publishes it if still current.
async fn run_computation(
    inner: &Inner,
    block: &ContentBlock,
    workspace: &Path,
    revision: u64,
) -> Result<Arc<DiffResult>, CoordinatorError> {
    mark_computing(inner, &block.block_id, revision);

    let outcome = compute(inner, block, workspace).await;

    let mut events = Vec::new();
    {
        let mut blocks = inner.blocks.lock();
        let entry = blocks
            .get_mut(&block.block_id)
            .filter(|entry| entry.state.revision == revision);
        match (entry, &outcome) {
            (Some(entry), Ok(result)) if revision > entry.state.published_revision => {
                entry.state.result = Some(Arc::clone(result));
                entry.state.published_revision = revision;
                entry.state.error = None;
                entry.state.set_status(ComputationStatus::Computed);
                entry.task = None;
                events.push(RedlineEvent::DiffComputed {
                    block_id: block.block_id.clone(),
                    revision,
                    result: Arc::clone(result),
                });
                events.push(RedlineEvent::StatusChanged {
                    block_id: block.block_id.clone(),
                    status: ComputationStatus::Computed,
                });
            }
            (Some(entry), Err(e)) => {
                warn!(block_id = %block.block_id, error = %e, "Diff computation failed");
                entry.state.error = Some(e.to_string());
                entry.state.set_status(ComputationStatus::Failed);
                entry.task = None;
                events.push(RedlineEvent::StatusChanged {
                    block_id: block.block_id.clone(),
                    status: ComputationStatus::Failed,
                });
            }
            _ => {
                debug!(block_id = %block.block_id, revision, "Dropping stale diff result");
            }
        }
    }
    for event in events {
        inner.events.publish(event);
    }

    outcome
}

fn mark_computing(inner: &Inner, block_id: &BlockId, revision: u64) {
    let changed = {
        let mut blocks = inner.blocks.lock();
        match blocks.get_mut(block_id) {
            Some(entry)
                if entry.state.revision == revision
                    && entry.state.status != ComputationStatus::Computing =>
            {
                entry.state.set_status(ComputationStatus::Computing);
                true
            }
            _ => false,
        }
    };
    if changed {
        inner.events.publish(RedlineEvent::StatusChanged {
            block_id: block_id.clone(),
            status: ComputationStatus::Computing,
        });
    }
}

async fn compute(
    inner: &Inner,
    block: &ContentBlock,
    workspace: &Path,
) -> Result<Arc<DiffResult>, CoordinatorError> {
    let path = WorkspacePolicy::new(workspace)
        .and_then(|policy| policy.resolve(&block.file_path))
        .map_err(|source| CoordinatorError::Policy {
            path: block.file_path.clone(),
            source,
        })?;
    let original = match inner.fs.read_bytes(&path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.is_not_found() => None,
        Err(source) => return Err(CoordinatorError::Read { path, source }),
    };

    let engine = inner.engine;
    let proposed = block.content.clone();
    let file_path = block.file_path.clone();
    let result = tokio::task::spawn_blocking(move || {
        engine.file(original.as_deref(), Some(proposed.as_bytes()), &file_path)
    })
    .await
    .map_err(|e| CoordinatorError::Task(e.to_string()))?;

    Ok(Arc::new(result))
}
