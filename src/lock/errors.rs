//! Lock error types

use std::io;

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Lock acquisition errors
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed busy through every retry
    #[error("{mode} lock still held by another process after {attempts} attempts")]
    Contention {
        /// Requested mode
        mode: &'static str,
        /// Attempts made, including the first
        attempts: u32,
    },

    /// The OS refused the lock for a reason other than contention
    #[error("I/O error: {message}")]
    Io {
        /// Context
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl LockError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        LockError::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            LockError::Contention { .. } => "ACCDB_LOCK_CONTENTION",
            LockError::Io { .. } => "ACCDB_LOCK_IO_ERROR",
        }
    }
}
