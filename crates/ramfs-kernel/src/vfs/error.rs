//! Failure kinds returned by every engine operation.

use std::io;
use thiserror::Error;

/// Classification of a failed flush to the backing directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FlushFailure {
    /// The backing store refused access.
    PermissionDenied,
    /// The backing directory (or an intermediate path) is missing.
    MissingPath,
    /// Any other I/O condition.
    Io,
}

impl FlushFailure {
    /// Classify an I/O error raised while exporting a file.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied
            }
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::MissingPath,
            _ => Self::Io,
        }
    }
}

/// Why an operation failed. Nothing is retried internally; the adapter
/// decides what to do with it.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Create, mkdir or link onto a bound path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A directory-only operation hit a file, or a file sat where a parent
    /// directory should be.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file-only operation hit a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Relative, non-UTF-8, or a directory moved beneath itself.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A component longer than `max_name_len`.
    #[error("file name too long: {0}")]
    NameTooLong(String),

    /// Operation refused (root removal, rename of `/`).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Offset or length beyond what an in-memory buffer can address.
    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    /// Unknown open-file handle.
    #[error("bad file handle: {0}")]
    BadHandle(u64),

    /// Exporting a file to the backing directory failed.
    ///
    /// In-memory state is untouched; the flush can be retried.
    #[error("flush of {path} failed ({failure}): {source}")]
    Flush {
        path: String,
        failure: FlushFailure,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Wrap an I/O error raised while flushing `path`.
    pub fn flush(path: impl Into<String>, source: io::Error) -> Self {
        Self::Flush {
            path: path.into(),
            failure: FlushFailure::classify(&source),
            source,
        }
    }

    /// The errno an OS-facing adapter should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::AlreadyExists(_) => libc::EEXIST,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::IsADirectory(_) => libc::EISDIR,
            VfsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            VfsError::InvalidPath(_) => libc::EINVAL,
            VfsError::NameTooLong(_) => libc::ENAMETOOLONG,
            VfsError::PermissionDenied(_) => libc::EPERM,
            VfsError::FileTooLarge(_) => libc::EFBIG,
            VfsError::BadHandle(_) => libc::EBADF,
            VfsError::Flush { failure, .. } => match failure {
                FlushFailure::PermissionDenied => libc::EPERM,
                FlushFailure::MissingPath => libc::ENOENT,
                FlushFailure::Io => libc::EIO,
            },
        }
    }
}

/// Lets `?` cross into `io::Result` code. Flush failures keep their cause.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NameTooLong(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::FileTooLarge(len) => {
                io::Error::new(io::ErrorKind::FileTooLarge, format!("file too large: {len} bytes"))
            }
            VfsError::BadHandle(fh) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad file handle: {fh}"))
            }
            VfsError::Flush { source, .. } => source,
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
