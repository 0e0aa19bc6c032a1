//! Whole-file compression codecs
//!
//! Two lossless byte-oriented codecs share the [`Codec`] trait:
//!
//! - [`HuffmanCodec`]: canonical Huffman with the code table embedded in
//!   the output header
//! - [`LzwCodec`]: LZW with 9..=24 bit codes whose width grows with the
//!   dictionary
//!
//! Codecs are stateless between calls; the only persisted state is the
//! header each one writes in front of its bit stream.

mod errors;
pub mod huffman;
pub mod lzw;

pub use errors::{CodecError, CodecResult};
pub use huffman::{HuffmanCodec, HuffmanConfig};
pub use lzw::{CapPolicy, LzwCodec, LzwConfig};

use std::fs;
use std::path::Path;

use crate::observability::{log_event_with_fields, Event};

/// Sizes observed by a whole-file codec run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecStats {
    /// Bytes read
    pub input_bytes: u64,
    /// Bytes written
    pub output_bytes: u64,
}

impl CodecStats {
    /// Create stats from input and output sizes
    pub fn new(input_bytes: u64, output_bytes: u64) -> Self {
        Self {
            input_bytes,
            output_bytes,
        }
    }

    /// Output size as a percentage of the input size (100.0 for empty input).
    pub fn ratio_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 100.0;
        }
        self.output_bytes as f64 / self.input_bytes as f64 * 100.0
    }
}

/// A lossless byte codec that can also transform whole files.
pub trait Codec {
    /// Short name used in logs and CLI output
    fn name(&self) -> &'static str;

    /// Compresses a buffer
    fn encode(&self, data: &[u8]) -> CodecResult<Vec<u8>>;

    /// Decompresses a buffer
    fn decode(&self, data: &[u8]) -> CodecResult<Vec<u8>>;

    /// Compresses the file at `input` into `output`.
    fn encode_file(&self, input: &Path, output: &Path) -> CodecResult<CodecStats> {
        let data = read_input(input)?;
        let encoded = self.encode(&data)?;
        write_output(output, &encoded)?;

        let stats = CodecStats::new(data.len() as u64, encoded.len() as u64);
        log_stats(Event::CodecEncode, self.name(), &stats);
        Ok(stats)
    }

    /// Decompresses the file at `input` into `output`.
    fn decode_file(&self, input: &Path, output: &Path) -> CodecResult<CodecStats> {
        let data = read_input(input)?;
        let decoded = self.decode(&data)?;
        write_output(output, &decoded)?;

        let stats = CodecStats::new(data.len() as u64, decoded.len() as u64);
        log_stats(Event::CodecDecode, self.name(), &stats);
        Ok(stats)
    }
}

fn read_input(path: &Path) -> CodecResult<Vec<u8>> {
    fs::read(path)
        .map_err(|e| CodecError::io(format!("Failed to read input: {}", path.display()), e))
}

fn write_output(path: &Path, data: &[u8]) -> CodecResult<()> {
    fs::write(path, data)
        .map_err(|e| CodecError::io(format!("Failed to write output: {}", path.display()), e))
}

fn log_stats(event: Event, codec: &str, stats: &CodecStats) {
    log_event_with_fields(
        event,
        &[
            ("codec", codec),
            ("input_bytes", &stats.input_bytes.to_string()),
            ("output_bytes", &stats.output_bytes.to_string()),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ratio_percent() {
        assert_eq!(CodecStats::new(200, 50).ratio_percent(), 25.0);
        assert_eq!(CodecStats::new(0, 5).ratio_percent(), 100.0);
    }

    #[test]
    fn test_file_roundtrip_through_trait() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("accidents.csv");
        let packed = temp_dir.path().join("accidents.pack");
        let restored = temp_dir.path().join("accidents.out");

        let body = "id;date;city;vehicles\n1;2021-01-01;Recife;2\n".repeat(40);
        fs::write(&original, &body).unwrap();

        let codecs: Vec<Box<dyn Codec>> = vec![
            Box::new(HuffmanCodec::default()),
            Box::new(LzwCodec::default()),
        ];
        for codec in codecs {
            let stats = codec.encode_file(&original, &packed).unwrap();
            assert_eq!(stats.input_bytes, body.len() as u64);
            assert!(stats.output_bytes < stats.input_bytes, "{} did not shrink", codec.name());

            codec.decode_file(&packed, &restored).unwrap();
            assert_eq!(fs::read(&restored).unwrap(), body.as_bytes());
        }
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = LzwCodec::default().encode_file(
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("out"),
        );
        assert!(matches!(result, Err(CodecError::Io { .. })));
    }
}
