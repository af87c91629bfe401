//! Workspace policy for file system access control.
//!
//! Every path an operation touches must resolve inside the workspace root.
//! Resolution is lexical first (so `..` cannot climb out), then the deepest
//! existing ancestor is canonicalized so a symlinked directory cannot point
//! outside either.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Reasons a path is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// No path was given.
    #[error("Path is empty")]
    EmptyPath,
    /// A path component contains a forbidden character.
    #[error("Path '{path}' contains an invalid character {character:?}")]
    InvalidCharacter {
        /// The offending path.
        path: PathBuf,
        /// The forbidden character.
        character: char,
    },
    /// The workspace root cannot be resolved.
    #[error("Invalid workspace '{path}': {reason}")]
    InvalidWorkspace {
        /// The workspace root.
        path: PathBuf,
        /// Why it could not be resolved.
        reason: String,
    },
    /// The path resolves outside the workspace.
    #[error("Security Violation: Path '{target}' is outside the workspace '{workspace}'.")]
    OutsideWorkspace {
        /// The requested path.
        target: PathBuf,
        /// The workspace root.
        workspace: PathBuf,
    },
}

/// Resolves operation paths against a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePolicy {
    root: PathBuf,
}

impl WorkspacePolicy {
    /// Creates a policy for an existing workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidWorkspace`] if the root cannot be
    /// canonicalized.
    pub fn new(workspace: &Path) -> Result<Self, PolicyError> {
        let root = dunce::canonicalize(workspace).map_err(|e| PolicyError::InvalidWorkspace {
            path: workspace.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// The canonical workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a workspace-relative or absolute path to a canonical path
    /// inside the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is empty
    /// - A component contains a NUL, control or `<>:"|?*` character
    /// - The path, after normalization or symlink resolution, leaves the workspace
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, PolicyError> {
        if path.as_os_str().is_empty() {
            return Err(PolicyError::EmptyPath);
        }
        check_characters(path)?;

        let outside = || PolicyError::OutsideWorkspace {
            target: path.to_path_buf(),
            workspace: self.root.clone(),
        };

        let normalized = normalize(path).ok_or_else(outside)?;
        let candidate = if normalized.is_absolute() {
            normalized
        } else {
            self.root.join(normalized)
        };

        match resolve_existing_prefix(&candidate) {
            Some(resolved) if resolved.starts_with(&self.root) && resolved != self.root => {
                Ok(resolved)
            }
            _ => Err(outside()),
        }
    }
}

fn check_characters(path: &Path) -> Result<(), PolicyError> {
    for component in path.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part.to_string_lossy();
        if let Some(character) = part
            .chars()
            .find(|c| c.is_control() || INVALID_CHARS.contains(c))
        {
            return Err(PolicyError::InvalidCharacter {
                path: path.to_path_buf(),
                character,
            });
        }
    }
    Ok(())
}

/// Lexically removes `.` and `..`; `None` if `..` climbs past the start.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// Canonicalizes the deepest existing ancestor and re-appends the rest.
///
/// `None` if a dangling symlink sits on the path.
fn resolve_existing_prefix(candidate: &Path) -> Option<PathBuf> {
    let mut existing = candidate;
    let mut missing: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if let Ok(canonical) = dunce::canonicalize(existing) {
            let mut resolved = canonical;
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return Some(resolved);
        }
        if existing.symlink_metadata().is_ok() {
            return None;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return Some(candidate.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_paths_resolve_inside() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let policy = WorkspacePolicy::new(dir.path())?;

        let resolved = policy.resolve(Path::new("src/main.rs"))?;
        assert_eq!(resolved, policy.root().join("src/main.rs"));

        let dotted = policy.resolve(Path::new("src/../lib.rs"))?;
        assert_eq!(dotted, policy.root().join("lib.rs"));
        Ok(())
    }

    #[test]
    fn test_traversal_is_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let policy = WorkspacePolicy::new(dir.path())?;

        let err = policy.resolve(Path::new("../secret.txt")).unwrap_err();
        assert!(matches!(err, PolicyError::OutsideWorkspace { .. }));
        assert!(policy.resolve(Path::new("a/../../b")).is_err());
        assert!(policy.resolve(Path::new("/etc/passwd")).is_err());
        assert!(policy.resolve(Path::new(".")).is_err());
        Ok(())
    }

    #[test]
    fn test_absolute_path_inside_workspace() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let policy = WorkspacePolicy::new(dir.path())?;
        let inside = policy.root().join("notes.md");
        assert_eq!(policy.resolve(&inside)?, inside);
        Ok(())
    }

    #[test]
    fn test_invalid_characters_are_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let policy = WorkspacePolicy::new(dir.path())?;

        assert_eq!(policy.resolve(Path::new("")), Err(PolicyError::EmptyPath));
        for bad in ["a?.txt", "b*.rs", "c|d", "e<f>", "tab\there", "nul\0byte"] {
            let err = policy.resolve(Path::new(bad)).unwrap_err();
            assert!(
                matches!(err, PolicyError::InvalidCharacter { .. }),
                "{bad} should be rejected"
            );
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_cannot_escape() -> anyhow::Result<()> {
        let outside = tempdir()?;
        let dir = tempdir()?;
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link"))?;
        let policy = WorkspacePolicy::new(dir.path())?;

        let err = policy.resolve(Path::new("link/file.txt")).unwrap_err();
        assert!(matches!(err, PolicyError::OutsideWorkspace { .. }));
        Ok(())
    }

    #[test]
    fn test_missing_workspace_is_invalid() {
        let err = WorkspacePolicy::new(Path::new("/definitely/not/here/ws")).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidWorkspace { .. }));
    }
}
