//! Events raised by the streaming coordinator and the apply orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::apply::ChangeType;
use crate::diff::DiffResult;
use crate::streaming::{BlockId, ComputationStatus};

/// A notification for observers such as a UI.
#[derive(Debug, Clone)]
pub enum RedlineEvent {
    /// A fresh diff was published for a block.
    DiffComputed {
        /// The block.
        block_id: BlockId,
        /// Revision the diff was computed from.
        revision: u64,
        /// The diff.
        result: Arc<DiffResult>,
    },
    /// A block moved to a new computation status.
    StatusChanged {
        /// The block.
        block_id: BlockId,
        /// Its new status.
        status: ComputationStatus,
    },
    /// A file change was applied.
    FileChanged {
        /// Affected file.
        path: PathBuf,
        /// Kind of change.
        change_type: ChangeType,
        /// Id of the history record.
        record_id: Uuid,
    },
    /// Applying a change to a file failed.
    ChangeFailed {
        /// Affected file.
        path: PathBuf,
        /// Error description.
        error: String,
    },
    /// A recorded change was undone.
    ChangeUndone {
        /// Affected file.
        path: PathBuf,
        /// Id of the removed history record.
        record_id: Uuid,
    },
    /// The file changed on disk after its diff was computed.
    ConflictDetected {
        /// Affected file.
        path: PathBuf,
        /// Description of the conflict.
        details: String,
    },
}

/// Errors raised while receiving events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Every sender is gone.
    #[error("Event channel closed")]
    ChannelClosed,
    /// The receiver fell behind and missed events.
    #[error("Receiver lagged, {0} events skipped")]
    Lagged(u64),
}
