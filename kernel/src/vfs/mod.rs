//! File system access: async primitives, workspace path policy, backups and
//! conflict detection.

/// Timestamped backup copies.
pub mod backup;
/// On-disk conflict detection.
pub mod conflict;
/// Async file primitives.
pub mod fs;
pub(crate) mod hashing;
/// Workspace path validation.
pub mod policy;
pub(crate) mod reflink;

pub use backup::{BackupError, BackupStore};
pub use conflict::{ConflictCheckResult, ConflictDetector, ConflictResolution};
pub use fs::{FileSystem, FsError, LocalFileSystem};
pub use policy::{PolicyError, WorkspacePolicy};
