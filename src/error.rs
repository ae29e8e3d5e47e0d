//! Error types for the library layer.
//!
//! The command-line front end wraps these in `anyhow` with context; library
//! callers can match on the variants to decide whether to retry.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the record store, the resolver and query execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading file content for hashing failed. Nothing was written.
    #[error("Failed to hash {}: {source}", path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SQLite error (open, query, transaction)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error outside of hashing (stat, directory creation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path cannot be stored (not valid UTF-8)
    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Sort columns and directions do not line up
    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    /// Concurrent writers kept conflicting past the retry budget
    #[error("Gave up resolving {} after {attempts} conflicting attempts", path.display())]
    Conflict { path: PathBuf, attempts: u32 },

    /// Stored rows violate an expected uniqueness rule
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl Error {
    /// Create an invalid sort error.
    pub fn invalid_sort(msg: impl Into<String>) -> Self {
        Self::InvalidSort(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// True when SQLite reported lock contention with another writer.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }

    /// True when the same call may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Hash { .. } | Self::Conflict { .. }) || self.is_busy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_error_is_retryable() {
        let err = Error::Hash {
            path: PathBuf::from("/media/a.mkv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("/media/a.mkv"));
    }

    #[test]
    fn test_busy_detection() {
        let busy = Error::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_busy());
        assert!(busy.is_retryable());

        let other = Error::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(!other.is_busy());
        assert!(!other.is_retryable());
    }

    #[test]
    fn test_invalid_sort_not_retryable() {
        assert!(!Error::invalid_sort("2 columns, 1 direction").is_retryable());
    }
}
