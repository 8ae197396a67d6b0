use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Caller-supplied data violates a validation rule.
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// A transient image source could not be opened (revoked permission,
    /// cancelled picker, missing file).
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (creating directories, copying attachments).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Another message writer already owns this database.
    #[error("Store is already open elsewhere (lock held on {})", .0.display())]
    Locked(PathBuf),

    /// The writer worker is not running, either because it was closed or
    /// because it never started.
    #[error("Store not initialized")]
    StoreNotInitialized,
}

/// Coarse classification of a [`StoreError`], used by callers to decide how
/// to react (fix the input, re-prompt the user, retry, or give up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidEntry,
    SourceUnavailable,
    StorageFailure,
    StoreNotInitialized,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidEntry(_) => ErrorKind::InvalidEntry,
            StoreError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            StoreError::Sqlite(_)
            | StoreError::Io(_)
            | StoreError::NoDataDir
            | StoreError::Migration(_) => ErrorKind::StorageFailure,
            StoreError::Locked(_) | StoreError::StoreNotInitialized => {
                ErrorKind::StoreNotInitialized
            }
        }
    }

    pub fn is_storage_failure(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_sqlite_errors_are_storage_failures() {
        let io = StoreError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(io.kind(), ErrorKind::StorageFailure);

        let sql = StoreError::from(rusqlite::Error::InvalidQuery);
        assert!(sql.is_storage_failure());
    }

    #[test]
    fn validation_errors_keep_their_kind() {
        assert_eq!(
            StoreError::InvalidEntry("empty".into()).kind(),
            ErrorKind::InvalidEntry
        );
        assert_eq!(
            StoreError::SourceUnavailable("gone".into()).kind(),
            ErrorKind::SourceUnavailable
        );
        assert_eq!(
            StoreError::StoreNotInitialized.kind(),
            ErrorKind::StoreNotInitialized
        );
        assert_eq!(
            StoreError::Locked(PathBuf::from("kallio.db.lock")).kind(),
            ErrorKind::StoreNotInitialized
        );
    }
}
