//! Codec error types
//!
//! Every malformed stream fails immediately; codecs never attempt to
//! resynchronise.

use std::io;

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors surfaced by the Huffman and LZW codecs
#[derive(Debug, Error)]
pub enum CodecError {
    /// Reading the input or writing the output file failed
    #[error("I/O error: {message}")]
    Io {
        /// What the codec was doing
        message: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Huffman header ends before the code table or length field is complete
    #[error("truncated Huffman header: {0}")]
    TruncatedHeader(String),

    /// Huffman code table is inconsistent (duplicate symbol, bad length, prefix clash)
    #[error("invalid Huffman code table: {0}")]
    InvalidTable(String),

    /// Huffman bit stream matches no code before it ends
    #[error("bit sequence matches no code at symbol {symbol_index}")]
    BadCode {
        /// Index of the symbol being decoded when the stream ran out
        symbol_index: u32,
    },

    /// Decoded symbol count or trailing padding disagrees with the header
    #[error("length mismatch in {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Which quantity disagreed
        what: &'static str,
        /// Value promised by the header
        expected: u64,
        /// Value actually observed
        actual: u64,
    },

    /// Input longer than the 32-bit length fields can describe
    #[error("input of {0} bytes exceeds the 32-bit length field")]
    InputTooLarge(u64),

    /// LZW code that is neither in the dictionary nor the next code to assign
    #[error("bad compressed code {code} (next code {next_code})")]
    BadCompressedCode {
        /// Offending code
        code: u32,
        /// Code the decoder would assign next
        next_code: u32,
    },

    /// LZW stream ends before `num_codes` codes were read
    #[error("truncated LZW stream: expected {expected} codes, read {read}")]
    TruncatedStream {
        /// Codes announced by the header
        expected: u32,
        /// Codes actually read
        read: u32,
    },

    /// LZW dictionary would grow past the configured width cap
    #[error("LZW dictionary overflow beyond {max_width}-bit cap")]
    OverflowBeyondCap {
        /// Configured maximum code width
        max_width: u8,
    },

    /// LZW start width outside the supported range
    #[error("invalid LZW code width {width} (allowed {min}..={max})")]
    InvalidWidth {
        /// Width read from the header or configuration
        width: u8,
        /// Minimum allowed width
        min: u8,
        /// Maximum allowed width
        max: u8,
    },
}

impl CodecError {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        CodecError::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::Io { .. } => "ACCDB_CODEC_IO_ERROR",
            CodecError::TruncatedHeader(_) => "ACCDB_CODEC_TRUNCATED_HEADER",
            CodecError::InvalidTable(_) => "ACCDB_CODEC_INVALID_TABLE",
            CodecError::BadCode { .. } => "ACCDB_CODEC_BAD_CODE",
            CodecError::LengthMismatch { .. } => "ACCDB_CODEC_LENGTH_MISMATCH",
            CodecError::InputTooLarge(_) => "ACCDB_CODEC_INPUT_TOO_LARGE",
            CodecError::BadCompressedCode { .. } => "ACCDB_CODEC_BAD_COMPRESSED_CODE",
            CodecError::TruncatedStream { .. } => "ACCDB_CODEC_TRUNCATED_STREAM",
            CodecError::OverflowBeyondCap { .. } => "ACCDB_CODEC_OVERFLOW_BEYOND_CAP",
            CodecError::InvalidWidth { .. } => "ACCDB_CODEC_INVALID_WIDTH",
        }
    }

    /// Returns whether the error means the compressed input is malformed
    pub fn is_corruption(&self) -> bool {
        !matches!(
            self,
            CodecError::Io { .. }
                | CodecError::OverflowBeyondCap { .. }
                | CodecError::InputTooLarge(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CodecError::BadCode { symbol_index: 3 }.code(),
            "ACCDB_CODEC_BAD_CODE"
        );
        assert_eq!(
            CodecError::OverflowBeyondCap { max_width: 12 }.code(),
            "ACCDB_CODEC_OVERFLOW_BEYOND_CAP"
        );
    }

    #[test]
    fn test_corruption_classification() {
        assert!(CodecError::TruncatedHeader("x".into()).is_corruption());
        assert!(CodecError::BadCompressedCode { code: 900, next_code: 300 }.is_corruption());
        assert!(!CodecError::OverflowBeyondCap { max_width: 9 }.is_corruption());
        let io_err = CodecError::io("read", io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!io_err.is_corruption());
    }

    #[test]
    fn test_display_includes_context() {
        let err = CodecError::TruncatedStream { expected: 10, read: 4 };
        let display = err.to_string();
        assert!(display.contains("10"));
        assert!(display.contains("4"));
    }
}
