//! Hash index error types

use std::io;

use thiserror::Error;

use crate::lock::LockError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Extendible hash index errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// Disk I/O failure
    #[error("I/O error: {message}")]
    Io {
        /// What the index was doing
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Directory or bucket file header is malformed
    #[error("corrupt index header: {0}")]
    CorruptHeader(String),

    /// Bucket page is malformed or a directory slot points outside the bucket file
    #[error("corrupt bucket at offset {offset}: {reason}")]
    CorruptBucket {
        /// Bucket offset in the bucket file
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// A split would need the directory to grow past the configured depth
    #[error("index depth exceeded: global depth limit is {max}")]
    DepthExceeded {
        /// Configured maximum global depth
        max: u32,
    },

    /// The bucket file was created with a different capacity
    #[error("bucket capacity mismatch: file has {found}, configured {expected}")]
    CapacityMismatch {
        /// Configured capacity
        expected: u32,
        /// Capacity stored in the bucket file
        found: u32,
    },

    /// Rejected index configuration
    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),

    /// `verify` found a broken structural invariant
    #[error("index invariant violated: {0}")]
    InvariantViolation(String),

    /// Lock acquisition failed
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl IndexError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        IndexError::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a corrupt bucket error
    pub fn corrupt_bucket(offset: u64, reason: impl Into<String>) -> Self {
        IndexError::CorruptBucket {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::Io { .. } => "ACCDB_INDEX_IO_ERROR",
            IndexError::CorruptHeader(_) => "ACCDB_INDEX_CORRUPT_HEADER",
            IndexError::CorruptBucket { .. } => "ACCDB_INDEX_CORRUPT_BUCKET",
            IndexError::DepthExceeded { .. } => "ACCDB_INDEX_DEPTH_EXCEEDED",
            IndexError::CapacityMismatch { .. } => "ACCDB_INDEX_CAPACITY_MISMATCH",
            IndexError::InvalidConfig(_) => "ACCDB_INDEX_INVALID_CONFIG",
            IndexError::InvariantViolation(_) => "ACCDB_INDEX_INVARIANT_VIOLATION",
            IndexError::Lock(e) => e.code(),
        }
    }

    /// Returns whether the error means the index files are damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            IndexError::CorruptHeader(_)
                | IndexError::CorruptBucket { .. }
                | IndexError::InvariantViolation(_)
        )
    }
}
