//! Error taxonomy shared by every cache entry point.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::cache::UserDataKey;

/// Errors returned by the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The final path component does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// An intermediate path component does not exist.
    #[error("a path component does not exist")]
    PathComponentNotFound,

    /// An intermediate path component is not a directory, or a trailing separator was used on
    /// a non-directory.
    #[error("a path component is not a directory")]
    NotADirectory,

    /// The path is longer than the configured limit.
    #[error("path exceeds the {max}-unit limit")]
    PathTooLong {
        /// The configured limit, in code units.
        max: usize,
    },

    /// The path could not be parsed.
    #[error("invalid path")]
    InvalidPath,

    /// The path uses a form the cache does not handle (device and verbatim prefixes).
    #[error("unsupported path form")]
    Unsupported,

    /// The platform denied access.
    #[error("access denied")]
    AccessDenied,

    /// A read-only lookup needed data that is not in the cache.
    #[error("not cached")]
    NotCached,

    /// A caller-supplied buffer is too small.
    #[error("buffer too small, {needed} units needed")]
    BufferTooSmall {
        /// The number of code units the path needs.
        needed: usize,
    },

    /// A user-data record with the same key is already attached.
    #[error("user data key {0:?} is already attached")]
    UserDataExists(UserDataKey),

    /// An allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Any other platform error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<TryReserveError> for CacheError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl CacheError {
    /// Map a platform error onto the cache's taxonomy.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ENOTDIR) {
            return Self::NotADirectory;
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::NotADirectory => Self::NotADirectory,
            io::ErrorKind::PermissionDenied => Self::AccessDenied,
            _ => Self::Io(err),
        }
    }

    /// The cacheable form of this error, if it has one.
    pub(crate) fn as_failure(&self) -> Option<LookupFailure> {
        match self {
            Self::NotFound => Some(LookupFailure::NotFound),
            Self::PathComponentNotFound => Some(LookupFailure::PathComponentNotFound),
            Self::NotADirectory => Some(LookupFailure::NotADirectory),
            _ => None,
        }
    }
}

/// A lookup failure that the path index may remember.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFailure {
    /// See [`CacheError::NotFound`].
    NotFound,
    /// See [`CacheError::PathComponentNotFound`].
    PathComponentNotFound,
    /// See [`CacheError::NotADirectory`].
    NotADirectory,
}

impl From<LookupFailure> for CacheError {
    fn from(failure: LookupFailure) -> Self {
        match failure {
            LookupFailure::NotFound => Self::NotFound,
            LookupFailure::PathComponentNotFound => Self::PathComponentNotFound,
            LookupFailure::NotADirectory => Self::NotADirectory,
        }
    }
}

/// Convenience alias.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Whether a platform error means the thing being looked at is gone.
pub(crate) fn is_vanished(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    ) || err.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_onto_taxonomy() {
        assert!(matches!(
            CacheError::from_io(io::Error::from(io::ErrorKind::NotFound)),
            CacheError::NotFound
        ));
        assert!(matches!(
            CacheError::from_io(io::Error::from_raw_os_error(libc::ENOTDIR)),
            CacheError::NotADirectory
        ));
        assert!(matches!(
            CacheError::from_io(io::Error::from(io::ErrorKind::PermissionDenied)),
            CacheError::AccessDenied
        ));
        assert!(matches!(
            CacheError::from_io(io::Error::other("disk on fire")),
            CacheError::Io(_)
        ));
    }

    #[test]
    fn only_lookup_failures_are_cacheable() {
        assert_eq!(
            CacheError::PathComponentNotFound.as_failure(),
            Some(LookupFailure::PathComponentNotFound)
        );
        assert_eq!(CacheError::AccessDenied.as_failure(), None);
        assert_eq!(CacheError::PathTooLong { max: 4 }.as_failure(), None);
    }
}
