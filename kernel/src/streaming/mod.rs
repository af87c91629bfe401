//! Keeping diffs current while proposed content is still streaming in.
//!
//! The first sighting of a block is diffed immediately. Later updates are
//! debounced, and [`StreamingDiffCoordinator::finalize`] computes the final
//! diff inline once the content is complete.

pub mod clock;
pub mod coordinator;
pub mod state;

pub use clock::{Clock, TokioClock};
pub use coordinator::{
    CoordinatorBuilder, CoordinatorError, DEFAULT_DEBOUNCE, StreamingDiffCoordinator,
};
pub use state::{BlockId, ComputationStatus, ContentBlock, DiffComputationState};
