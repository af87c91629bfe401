//! Redline kernel: diff preview, streaming recomputation and transactional
//! apply/undo for proposed file changes.
//!
//! Proposed content flows through three stages: the [`diff`] engine turns two
//! texts into hunks for review, the [`streaming`] coordinator keeps a diff
//! fresh while content is still arriving, and the [`apply`] orchestrator
//! writes accepted changes with backups, rollback and undo.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Backed-up, rollback-capable file writes with undo history.
pub mod apply;
/// Line diffs, hunks and unified rendering.
pub mod diff;
/// Typed notifications for observers.
pub mod events;
/// Infrastructure components (audit, config, telemetry).
pub mod infrastructure;
/// Debounced per-block diff recomputation.
pub mod streaming;
/// File system access, workspace policy, backups and conflict detection.
pub mod vfs;
