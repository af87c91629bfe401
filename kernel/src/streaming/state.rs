//! Per-block computation state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::diff::DiffResult;

/// Identifier of a logical content block, such as one code block in a
/// streamed assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(String);

impl BlockId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The full current text of a block and the file it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    /// The block.
    pub block_id: BlockId,
    /// Target file, relative to the workspace.
    pub file_path: PathBuf,
    /// Current proposed content.
    pub content: String,
}

impl ContentBlock {
    /// Creates a content block.
    pub fn new(
        block_id: impl Into<BlockId>,
        file_path: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            file_path: file_path.into(),
            content: content.into(),
        }
    }
}

/// Where a block is in its computation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    /// Seen for the first time; an immediate computation is scheduled.
    Detected,
    /// Waiting for the quiet period to elapse.
    Debouncing,
    /// A computation is running.
    Computing,
    /// A result is published.
    Computed,
    /// Work for the block was cancelled.
    Cancelled,
    /// The last computation failed.
    Failed,
}

/// Snapshot of a block's state, handed out by value.
#[derive(Debug, Clone)]
pub struct DiffComputationState {
    /// The block.
    pub block_id: BlockId,
    /// Target file, relative to the workspace.
    pub file_path: PathBuf,
    /// Lifecycle status.
    pub status: ComputationStatus,
    /// Last published diff.
    pub result: Option<Arc<DiffResult>>,
    /// Bumped on every content change.
    pub revision: u64,
    /// Revision of `result`; never decreases.
    pub published_revision: u64,
    /// Message of the last failure.
    pub error: Option<String>,
    /// Time of the last state change.
    pub updated_at: DateTime<Utc>,
}

impl DiffComputationState {
    pub(crate) fn new(block_id: BlockId, file_path: PathBuf) -> Self {
        Self {
            block_id,
            file_path,
            status: ComputationStatus::Detected,
            result: None,
            revision: 0,
            published_revision: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn set_status(&mut self, status: ComputationStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// True when the published result reflects the latest content.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.result.is_some() && self.published_revision == self.revision
    }
}
