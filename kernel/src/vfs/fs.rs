//! Async file primitives behind a trait so callers can substitute their own.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by [`FileSystem`] implementations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// The file exists but is not valid UTF-8.
    #[error("File is not valid UTF-8: {0}")]
    InvalidUtf8(PathBuf),
    /// Any other I/O failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Wraps an I/O error, mapping `NotFound` to [`FsError::NotFound`].
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// True when the error means the path is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// File operations used by the streaming coordinator, conflict detector and
/// apply orchestrator.
#[async_trait]
pub trait FileSystem: Send + Sync + Debug {
    /// Reads a whole file as UTF-8 text.
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError>;

    /// Reads a whole file as bytes.
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    /// Writes `contents`, creating parent directories as needed.
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError>;

    /// Whether anything exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> Result<(), FsError>;

    /// Creates a directory and all of its missing parents.
    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Removes an empty directory.
    async fn remove_dir(&self, path: &Path) -> Result<(), FsError>;
}

/// [`FileSystem`] over the local disk via `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates a new local file system handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        let bytes = self.read_bytes(path).await?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8(path.to_path_buf()))
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            self.create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }
}
