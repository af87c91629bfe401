//! Typed event channel for observers of diff computation and file changes.

pub mod broadcaster;
pub mod types;

pub use broadcaster::{EventBroadcaster, EventReceiver};
pub use types::{EventError, RedlineEvent};
