//! Record store error types
//!
//! Corruption is reported with the byte offset of the frame involved so a
//! caller can decide between skipping, repairing and failing.

use std::io;

use thiserror::Error;

use crate::lock::LockError;

/// Result type for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Disk I/O failure
    #[error("I/O error: {message}")]
    Io {
        /// What the store was doing
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The file exists but is too short to hold the `last_id` header
    #[error("corrupt store header: file is {len} bytes, header needs 4")]
    CorruptHeader {
        /// Actual file length
        len: u64,
    },

    /// Stored checksum does not match the payload, or the frame is malformed
    #[error("corrupt record id {id} at offset {offset}")]
    CorruptRecord {
        /// Byte offset of the frame
        offset: u64,
        /// Id stored in the frame header
        id: u32,
    },

    /// Frame runs past end-of-file
    #[error("truncated frame at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        /// Byte offset of the frame
        offset: u64,
        /// Bytes the frame declares
        needed: u64,
        /// Bytes left in the file
        available: u64,
    },

    /// Offset does not point into the record area
    #[error("offset {0} is outside the record area")]
    InvalidOffset(u64),

    /// Payload too large for the 32-bit length field
    #[error("payload of {0} bytes exceeds the frame length field")]
    PayloadTooLarge(u64),

    /// Every u32 id has been assigned
    #[error("record id space exhausted")]
    IdExhausted,

    /// Lock acquisition failed
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "ACCDB_STORE_IO_ERROR",
            StoreError::CorruptHeader { .. } => "ACCDB_STORE_CORRUPT_HEADER",
            StoreError::CorruptRecord { .. } => "ACCDB_STORE_CORRUPT_RECORD",
            StoreError::Truncated { .. } => "ACCDB_STORE_TRUNCATED",
            StoreError::InvalidOffset(_) => "ACCDB_STORE_INVALID_OFFSET",
            StoreError::PayloadTooLarge(_) => "ACCDB_STORE_PAYLOAD_TOO_LARGE",
            StoreError::IdExhausted => "ACCDB_STORE_ID_EXHAUSTED",
            StoreError::Lock(e) => e.code(),
        }
    }

    /// Returns whether the error means the file content is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::CorruptHeader { .. }
                | StoreError::CorruptRecord { .. }
                | StoreError::Truncated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::CorruptRecord { offset: 4, id: 1 }.code(),
            "ACCDB_STORE_CORRUPT_RECORD"
        );
        assert_eq!(
            StoreError::Lock(LockError::Contention { mode: "shared", attempts: 1 }).code(),
            "ACCDB_LOCK_CONTENTION"
        );
    }

    #[test]
    fn test_corruption_classification() {
        assert!(StoreError::CorruptHeader { len: 2 }.is_corruption());
        assert!(StoreError::Truncated { offset: 4, needed: 50, available: 10 }.is_corruption());
        assert!(!StoreError::IdExhausted.is_corruption());
        assert!(!StoreError::InvalidOffset(0).is_corruption());
    }

    #[test]
    fn test_display_includes_offset() {
        let err = StoreError::CorruptRecord { offset: 54, id: 2 };
        assert!(err.to_string().contains("54"));
    }
}
