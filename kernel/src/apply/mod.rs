//! Transactional application of file operations with backup, rollback and
//! undo.

pub mod errors;
pub mod history;
pub(crate) mod locks;
pub mod orchestrator;
pub(crate) mod rollback;
pub mod types;

pub use errors::ApplyError;
pub use history::{ChangeHistory, DEFAULT_MAX_RECORDS_PER_FILE};
pub use orchestrator::{ApplyOrchestrator, ProgressCallback};
pub use types::{
    ApplyOptions, ApplyResult, ApplyStatus, BatchApplyResult, BatchPhase, BatchProgress,
    BatchUndoResult, ChangeType, FileChangeRecord, FileOperation, FileOperationKind,
};
