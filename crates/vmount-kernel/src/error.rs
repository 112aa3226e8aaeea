//! Mounting error types.

use std::io;
use thiserror::Error;

/// Error type for mount-tree and filesystem-protocol operations.
///
/// Every failure is local to the call that produced it; nothing in this
/// crate retries or escalates. The bridge maps these onto whatever status
/// codes its driver protocol speaks.
#[derive(Debug, Error)]
pub enum MountError {
    /// The final path segment did not resolve to a resource.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// An interior path segment was missing, or the target was expected to
    /// be a directory and was not.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A mount root with this name already exists. Caller configuration
    /// error, not a recoverable runtime condition.
    #[error("mount root already exists: {0}")]
    DuplicateRootName(String),

    /// No mount root with this name.
    #[error("no mount root named: {0}")]
    UnknownRoot(String),

    /// A resource with this name already exists under the mount root.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory-capable resource.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The mounted view is a read-only projection; mutating operations
    /// always fail with this.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The node has no backing accessor, or its stream could not be opened.
    #[error("backing accessor unavailable: {0}")]
    AccessorUnavailable(String),

    /// The handle was invalidated by disposal of its mount root.
    #[error("handle is closed")]
    HandleClosed,

    /// The handle token is not registered in the handle table.
    #[error("invalid handle")]
    InvalidHandle,

    /// I/O error from a backing stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MountError {
    /// Create a FileNotFound error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound(path.into())
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Create a DuplicateRootName error.
    pub fn duplicate_root(name: impl Into<String>) -> Self {
        Self::DuplicateRootName(name.into())
    }

    /// Create an UnknownRoot error.
    pub fn unknown_root(name: impl Into<String>) -> Self {
        Self::UnknownRoot(name.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(name: impl Into<String>) -> Self {
        Self::NotADirectory(name.into())
    }

    /// Create an AccessorUnavailable error.
    pub fn accessor_unavailable(msg: impl Into<String>) -> Self {
        Self::AccessorUnavailable(msg.into())
    }
}

/// Convert MountError to std::io::Error for consumers that speak io::Error.
impl From<MountError> for io::Error {
    fn from(e: MountError) -> Self {
        match e {
            MountError::FileNotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            MountError::PathNotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            MountError::DuplicateRootName(msg) => {
                io::Error::new(io::ErrorKind::AlreadyExists, msg)
            }
            MountError::UnknownRoot(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            MountError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            MountError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            MountError::Unsupported(op) => {
                io::Error::new(io::ErrorKind::Unsupported, format!("unsupported operation: {op}"))
            }
            MountError::AccessorUnavailable(msg) => io::Error::other(msg),
            MountError::HandleClosed => {
                io::Error::new(io::ErrorKind::BrokenPipe, "handle is closed")
            }
            MountError::InvalidHandle => {
                io::Error::new(io::ErrorKind::InvalidInput, "invalid handle")
            }
            MountError::Io(e) => e,
        }
    }
}

/// Mounting result type.
pub type MountResult<T> = Result<T, MountError>;
