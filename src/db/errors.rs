//! Database facade errors and their process exit codes

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::lock::LockError;
use crate::storage::StoreError;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Exit code: success
pub const EXIT_OK: i32 = 0;
/// Exit code: bad arguments, bad config, rejected payload
pub const EXIT_USAGE: i32 = 1;
/// Exit code: corrupt or unreadable file
pub const EXIT_CORRUPT: i32 = 2;
/// Exit code: absent or tombstoned id
pub const EXIT_NOT_FOUND: i32 = 3;
/// Exit code: lock still busy after retries
pub const EXIT_LOCK_CONTENTION: i32 = 4;

/// Errors surfaced by [`Database`](super::Database)
#[derive(Debug, Error)]
pub enum DbError {
    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Hash index failure
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Payload rejected by the validator
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No record with this id
    #[error("record {0} not found")]
    NotFound(u32),

    /// Record exists but was deleted
    #[error("record {0} is deleted")]
    Tombstoned(u32),

    /// The index points at a frame holding a different id
    #[error("index maps id {id} to offset {offset}, which holds id {found}; run reindex")]
    IndexMismatch {
        /// Id looked up
        id: u32,
        /// Offset from the index
        offset: u64,
        /// Id found in the store
        found: u32,
    },

    /// Filesystem failure outside the store and index
    #[error("I/O error: {message}")]
    Io {
        /// What the database was doing
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl DbError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        DbError::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            DbError::Store(e) => e.code(),
            DbError::Index(e) => e.code(),
            DbError::Config(e) => e.code(),
            DbError::InvalidPayload(_) => "ACCDB_DB_INVALID_PAYLOAD",
            DbError::NotFound(_) => "ACCDB_DB_NOT_FOUND",
            DbError::Tombstoned(_) => "ACCDB_DB_TOMBSTONED",
            DbError::IndexMismatch { .. } => "ACCDB_DB_INDEX_MISMATCH",
            DbError::Io { .. } => "ACCDB_DB_IO_ERROR",
        }
    }

    /// Returns whether the error means a store or index file is damaged
    pub fn is_corruption(&self) -> bool {
        match self {
            DbError::Store(e) => e.is_corruption(),
            DbError::Index(e) => e.is_corruption(),
            DbError::IndexMismatch { .. } => true,
            _ => false,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DbError::Store(StoreError::Lock(LockError::Contention { .. }))
            | DbError::Index(IndexError::Lock(LockError::Contention { .. })) => {
                EXIT_LOCK_CONTENTION
            }
            e if e.is_corruption() => EXIT_CORRUPT,
            DbError::Config(_)
            | DbError::InvalidPayload(_)
            | DbError::Store(StoreError::PayloadTooLarge(_))
            | DbError::Index(IndexError::InvalidConfig(_))
            | DbError::Index(IndexError::CapacityMismatch { .. }) => EXIT_USAGE,
            DbError::NotFound(_) | DbError::Tombstoned(_) => EXIT_NOT_FOUND,
            // I/O failures, exhausted id space, directory at its depth limit
            _ => EXIT_CORRUPT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DbError::NotFound(9).exit_code(), EXIT_NOT_FOUND);
        assert_eq!(DbError::Tombstoned(9).exit_code(), EXIT_NOT_FOUND);
        assert_eq!(DbError::InvalidPayload("x".into()).exit_code(), EXIT_USAGE);
        assert_eq!(
            DbError::Store(StoreError::CorruptRecord { offset: 4, id: 1 }).exit_code(),
            EXIT_CORRUPT
        );
        assert_eq!(
            DbError::Index(IndexError::Lock(LockError::Contention {
                mode: "exclusive",
                attempts: 6
            }))
            .exit_code(),
            EXIT_LOCK_CONTENTION
        );
        assert_eq!(
            DbError::Index(IndexError::CapacityMismatch { expected: 31, found: 4 }).exit_code(),
            EXIT_USAGE
        );
    }

    #[test]
    fn test_corruption_classification() {
        assert!(DbError::from(StoreError::Truncated { offset: 4, needed: 9, available: 2 })
            .is_corruption());
        assert!(DbError::IndexMismatch { id: 3, offset: 50, found: 4 }.is_corruption());
        assert!(!DbError::from(IndexError::DepthExceeded { max: 3 }).is_corruption());
        assert!(!DbError::NotFound(3).is_corruption());
        assert_eq!(
            DbError::from(IndexError::DepthExceeded { max: 3 }).exit_code(),
            EXIT_CORRUPT
        );
    }

    #[test]
    fn test_codes_delegate() {
        let err = DbError::from(StoreError::CorruptHeader { len: 1 });
        assert_eq!(err.code(), "ACCDB_STORE_CORRUPT_HEADER");
        assert_eq!(DbError::NotFound(1).code(), "ACCDB_DB_NOT_FOUND");
    }
}
