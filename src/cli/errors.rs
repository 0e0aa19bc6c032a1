//! CLI-specific error types

use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::db::{DbError, EXIT_CORRUPT, EXIT_USAGE};

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database failure
    #[error(transparent)]
    Db(#[from] DbError),

    /// Codec failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Reading an input or writing an output file failed
    #[error("I/O error: {message}")]
    Io {
        /// What the CLI was doing
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Encoding a response failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        CliError::Io {
            message: message.into(),
            source,
        }
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Db(e) => e.code(),
            CliError::Codec(e) => e.code(),
            CliError::Io { .. } => "ACCDB_CLI_IO_ERROR",
            CliError::Json(_) => "ACCDB_CLI_JSON_ERROR",
        }
    }

    /// Process exit code
    ///
    /// A codec input the configured limits cannot represent is a usage
    /// error; a damaged or unreadable file is not.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_USAGE,
            CliError::Db(e) => e.exit_code(),
            CliError::Codec(e) if e.is_corruption() => EXIT_CORRUPT,
            CliError::Codec(CodecError::Io { .. }) | CliError::Io { .. } | CliError::Json(_) => {
                EXIT_CORRUPT
            }
            CliError::Codec(_) => EXIT_USAGE,
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
