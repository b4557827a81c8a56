//! Errors reported by backing drivers.
//!
//! The overlay never interprets these; it re-tags them as
//! [`crate::UcfsError::Backing`] with the cause intact.

use std::io;
use thiserror::Error;

use super::types::{FileHandle, FileType};

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The handle was opened without the access the operation needs.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("backing store is read-only")]
    ReadOnly,

    /// The path names a file where a directory is needed, or the reverse.
    #[error("{path}: expected a {expected}")]
    WrongKind { path: String, expected: FileType },

    /// A canonical path resolved outside the driver's host directory.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Handle was never issued by this driver, or is already closed.
    #[error("bad file handle: {0}")]
    BadHandle(FileHandle),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// A file sits where a directory was expected.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::WrongKind {
            path: path.into(),
            expected: FileType::Directory,
        }
    }

    /// A directory sits where a file was expected.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::WrongKind {
            path: path.into(),
            expected: FileType::File,
        }
    }

    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Self::InvalidPath(reason.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Closest `io::ErrorKind`, for hosts that speak `std::io`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            VfsError::PermissionDenied(_) | VfsError::PathEscapesRoot(_) => {
                io::ErrorKind::PermissionDenied
            }
            VfsError::ReadOnly => io::ErrorKind::ReadOnlyFilesystem,
            VfsError::WrongKind {
                expected: FileType::Directory,
                ..
            } => io::ErrorKind::NotADirectory,
            VfsError::WrongKind {
                expected: FileType::File,
                ..
            } => io::ErrorKind::IsADirectory,
            VfsError::InvalidPath(_) | VfsError::BadHandle(_) => io::ErrorKind::InvalidInput,
            VfsError::Io(e) => e.kind(),
            VfsError::Other(_) => io::ErrorKind::Other,
        }
    }
}

impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(inner) => inner,
            other => io::Error::new(other.kind(), other),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
