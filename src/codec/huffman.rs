//! Canonical Huffman codec with an embedded code table
//!
//! Compressed layout (integers little-endian):
//!
//! ```text
//! +----------------------+
//! | table_size (u32)     |  0xFFFF_FFFF = stored (raw bytes follow)
//! +----------------------+
//! | symbol   (u8)        |
//! | code_len (u8)        |  repeated table_size times,
//! | code     (u32)       |  ascending by symbol
//! +----------------------+
//! | payload_len (u32)    |  number of symbols in the original input
//! +----------------------+
//! | bit stream           |  codes concatenated MSB-first
//! +----------------------+
//! | pad (u8)             |  zero bits appended to the final stream byte
//! +----------------------+
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use super::errors::{CodecError, CodecResult};
use super::Codec;
use crate::bitio::{BitReader, BitWriter};

/// Inputs shorter than this are stored instead of compressed
pub const DEFAULT_MIN_COMPRESS_LEN: usize = 100;

/// `table_size` value marking a stored (uncompressed) body
pub const STORED_SENTINEL: u32 = u32::MAX;

/// Longest code the 32-bit code field can carry
const MAX_CODE_LEN: u8 = 32;

const TABLE_ENTRY_BYTES: usize = 1 + 1 + 4;

/// Huffman codec settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuffmanConfig {
    /// Inputs shorter than this many bytes are stored raw
    pub min_compress_len: usize,
}

impl Default for HuffmanConfig {
    fn default() -> Self {
        Self {
            min_compress_len: DEFAULT_MIN_COMPRESS_LEN,
        }
    }
}

/// One row of the code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    /// Byte value
    pub symbol: u8,
    /// Code length in bits (1..=32)
    pub len: u8,
    /// Code, right-aligned
    pub bits: u32,
}

/// Parsed form of a compressed file's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuffmanHeader {
    /// Body is the original input verbatim
    Stored {
        /// Length of the stored body
        len: usize,
    },
    /// Body is a Huffman bit stream
    Coded {
        /// Code table, ascending by symbol
        table: Vec<CodeEntry>,
        /// Number of symbols to decode
        payload_len: u32,
        /// Byte offset where the bit stream starts
        stream_start: usize,
    },
}

/// Node of the construction tree, stored in an arena.
#[derive(Debug)]
struct BuildNode {
    children: Option<(usize, usize)>,
    symbol: u8,
}

/// Huffman encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct HuffmanCodec {
    config: HuffmanConfig,
}

impl HuffmanCodec {
    /// Create a codec with the given settings
    pub fn new(config: HuffmanConfig) -> Self {
        Self { config }
    }

    /// Returns the codec settings
    pub fn config(&self) -> &HuffmanConfig {
        &self.config
    }

    /// Compresses `data`.
    pub fn encode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        let payload_len =
            u32::try_from(data.len()).map_err(|_| CodecError::InputTooLarge(data.len() as u64))?;

        if data.len() < self.config.min_compress_len {
            let mut out = Vec::with_capacity(4 + data.len());
            out.extend_from_slice(&STORED_SENTINEL.to_le_bytes());
            out.extend_from_slice(data);
            return Ok(out);
        }

        let table = build_code_table(data);

        let mut header = Vec::with_capacity(8 + table.len() * TABLE_ENTRY_BYTES);
        header.extend_from_slice(&(table.len() as u32).to_le_bytes());
        let mut lookup: [Option<(u32, u8)>; 256] = [None; 256];
        for entry in &table {
            header.push(entry.symbol);
            header.push(entry.len);
            header.extend_from_slice(&entry.bits.to_le_bytes());
            lookup[entry.symbol as usize] = Some((entry.bits, entry.len));
        }
        header.extend_from_slice(&payload_len.to_le_bytes());

        let mut writer = BitWriter::with_prefix(header);
        for &byte in data {
            // Every input byte has a table entry by construction.
            if let Some((bits, len)) = lookup[byte as usize] {
                writer.write_bits(bits, len);
            }
        }
        let pad = writer.flush();
        let mut out = writer.into_bytes();
        out.push(pad);
        Ok(out)
    }

    /// Decompresses a buffer produced by [`HuffmanCodec::encode`].
    pub fn decode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        match parse_header(data)? {
            HuffmanHeader::Stored { .. } => Ok(data[4..].to_vec()),
            HuffmanHeader::Coded {
                table,
                payload_len,
                stream_start,
            } => decode_stream(data, &table, payload_len, stream_start),
        }
    }
}

impl Codec for HuffmanCodec {
    fn name(&self) -> &'static str {
        "huffman"
    }

    fn encode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        HuffmanCodec::encode(self, data)
    }

    fn decode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        HuffmanCodec::decode(self, data)
    }
}

/// Builds the canonical code table for `data`, ascending by symbol.
///
/// Returns an empty table for empty input.
pub fn build_code_table(data: &[u8]) -> Vec<CodeEntry> {
    let mut freqs = [0u64; 256];
    for &byte in data {
        freqs[byte as usize] += 1;
    }

    assign_canonical(&limited_lengths(freqs))
}

/// Code lengths capped at 32 bits: frequencies are halved (never below one)
/// until the tree is shallow enough.
fn limited_lengths(mut freqs: [u64; 256]) -> [u8; 256] {
    let mut lengths = code_lengths(&freqs);
    while lengths.iter().any(|&len| len > MAX_CODE_LEN) {
        for f in freqs.iter_mut().filter(|f| **f > 0) {
            *f = (*f / 2).max(1);
        }
        lengths = code_lengths(&freqs);
    }
    lengths
}

/// Computes per-symbol code lengths from a Huffman tree (0 = unused symbol).
fn code_lengths(freqs: &[u64; 256]) -> [u8; 256] {
    let mut lengths = [0u8; 256];
    let mut nodes: Vec<BuildNode> = Vec::new();
    // (freq, insertion order); the arena index doubles as the tie-breaker.
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();

    for (symbol, &freq) in freqs.iter().enumerate() {
        if freq > 0 {
            heap.push(Reverse((freq, nodes.len())));
            nodes.push(BuildNode {
                children: None,
                symbol: symbol as u8,
            });
        }
    }

    match nodes.len() {
        0 => return lengths,
        1 => {
            lengths[nodes[0].symbol as usize] = 1;
            return lengths;
        }
        _ => {}
    }

    while heap.len() > 1 {
        let (Some(Reverse((f1, a))), Some(Reverse((f2, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        heap.push(Reverse((f1 + f2, nodes.len())));
        nodes.push(BuildNode {
            children: Some((a, b)),
            symbol: 0,
        });
    }

    let root = nodes.len() - 1;
    let mut stack = vec![(root, 0u32)];
    while let Some((index, depth)) = stack.pop() {
        match nodes[index].children {
            Some((left, right)) => {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
            None => lengths[nodes[index].symbol as usize] = depth.min(u32::from(u8::MAX)) as u8,
        }
    }
    lengths
}

/// Assigns canonical codes: ascending by (length, symbol), each code one
/// greater than the previous, shifted left whenever the length grows.
fn assign_canonical(lengths: &[u8; 256]) -> Vec<CodeEntry> {
    let mut order: Vec<(u8, u8)> = lengths
        .iter()
        .enumerate()
        .filter(|(_, &len)| len > 0)
        .map(|(symbol, &len)| (len, symbol as u8))
        .collect();
    order.sort_unstable();

    let mut table = Vec::with_capacity(order.len());
    let mut code: u64 = 0;
    let mut prev_len = order.first().map(|&(len, _)| len).unwrap_or(0);
    for (len, symbol) in order {
        code <<= len - prev_len;
        table.push(CodeEntry {
            symbol,
            len,
            bits: code as u32,
        });
        code += 1;
        prev_len = len;
    }

    table.sort_unstable_by_key(|entry| entry.symbol);
    table
}

/// Parses the header of a compressed buffer.
pub fn parse_header(data: &[u8]) -> CodecResult<HuffmanHeader> {
    let table_size = read_u32_le(data, 0)
        .ok_or_else(|| CodecError::TruncatedHeader("missing table size".into()))?;

    if table_size == STORED_SENTINEL {
        return Ok(HuffmanHeader::Stored {
            len: data.len() - 4,
        });
    }
    if table_size > 256 {
        return Err(CodecError::InvalidTable(format!(
            "table size {} exceeds 256 symbols",
            table_size
        )));
    }

    let table_end = 4 + table_size as usize * TABLE_ENTRY_BYTES;
    // Length field plus the trailing pad byte.
    if data.len() < table_end + 4 + 1 {
        return Err(CodecError::TruncatedHeader(format!(
            "{} bytes cannot hold a {}-entry table",
            data.len(),
            table_size
        )));
    }

    let mut table = Vec::with_capacity(table_size as usize);
    let mut seen = HashSet::new();
    for i in 0..table_size as usize {
        let at = 4 + i * TABLE_ENTRY_BYTES;
        let symbol = data[at];
        let len = data[at + 1];
        let bits = read_u32_le(data, at + 2).unwrap_or_default();

        if len == 0 || len > MAX_CODE_LEN {
            return Err(CodecError::InvalidTable(format!(
                "symbol {} has code length {}",
                symbol, len
            )));
        }
        if len < 32 && bits >> len != 0 {
            return Err(CodecError::InvalidTable(format!(
                "symbol {} code {:#x} wider than {} bits",
                symbol, bits, len
            )));
        }
        if !seen.insert(symbol) {
            return Err(CodecError::InvalidTable(format!("duplicate symbol {}", symbol)));
        }
        table.push(CodeEntry { symbol, len, bits });
    }

    let payload_len = read_u32_le(data, table_end).unwrap_or_default();
    Ok(HuffmanHeader::Coded {
        table,
        payload_len,
        stream_start: table_end + 4,
    })
}

/// Decoding trie node: `children[bit]` indexes into the arena.
#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: [Option<usize>; 2],
    symbol: Option<u8>,
}

fn build_trie(table: &[CodeEntry]) -> CodecResult<Vec<TrieNode>> {
    let mut trie = vec![TrieNode::default()];
    for entry in table {
        let mut node = 0;
        for i in (0..entry.len).rev() {
            if trie[node].symbol.is_some() {
                return Err(CodecError::InvalidTable(format!(
                    "code for symbol {} extends another code",
                    entry.symbol
                )));
            }
            let bit = ((entry.bits >> i) & 1) as usize;
            node = match trie[node].children[bit] {
                Some(next) => next,
                None => {
                    trie.push(TrieNode::default());
                    let next = trie.len() - 1;
                    trie[node].children[bit] = Some(next);
                    next
                }
            };
        }
        if trie[node].symbol.is_some() || trie[node].children.iter().any(Option::is_some) {
            return Err(CodecError::InvalidTable(format!(
                "code for symbol {} collides with another code",
                entry.symbol
            )));
        }
        trie[node].symbol = Some(entry.symbol);
    }
    Ok(trie)
}

fn decode_stream(
    data: &[u8],
    table: &[CodeEntry],
    payload_len: u32,
    stream_start: usize,
) -> CodecResult<Vec<u8>> {
    let pad_at = data.len() - 1;
    let pad = data[pad_at];
    let stream = &data[stream_start..pad_at];
    let stream_bits = stream.len() as u64 * 8;
    if pad > 7 || u64::from(pad) > stream_bits {
        return Err(CodecError::LengthMismatch {
            what: "padding bits",
            expected: 7.min(stream_bits),
            actual: u64::from(pad),
        });
    }
    if payload_len > 0 && table.is_empty() {
        return Err(CodecError::InvalidTable(
            "empty table for non-empty payload".into(),
        ));
    }

    let trie = build_trie(table)?;
    let mut reader = BitReader::with_bit_len(stream, stream_bits - u64::from(pad));
    let mut out = Vec::with_capacity(payload_len as usize);

    for symbol_index in 0..payload_len {
        let mut node = 0;
        loop {
            let bit = reader
                .read_bit()
                .ok_or(CodecError::BadCode { symbol_index })?;
            node = trie[node].children[usize::from(bit)]
                .ok_or(CodecError::BadCode { symbol_index })?;
            if let Some(symbol) = trie[node].symbol {
                out.push(symbol);
                break;
            }
        }
    }

    if reader.remaining_bits() != 0 {
        return Err(CodecError::LengthMismatch {
            what: "trailing stream bits",
            expected: 0,
            actual: reader.remaining_bits(),
        });
    }
    Ok(out)
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_compress() -> HuffmanCodec {
        HuffmanCodec::new(HuffmanConfig { min_compress_len: 0 })
    }

    fn table_of(encoded: &[u8]) -> Vec<CodeEntry> {
        match parse_header(encoded).unwrap() {
            HuffmanHeader::Coded { table, .. } => table,
            other => panic!("expected coded header, got {:?}", other),
        }
    }

    #[test]
    fn test_four_symbol_table() {
        let codec = always_compress();
        let input = b"AAAAABBBCCD";
        let encoded = codec.encode(input).unwrap();

        let table = table_of(&encoded);
        assert_eq!(table.len(), 4);
        let symbols: Vec<u8> = table.iter().map(|e| e.symbol).collect();
        assert_eq!(symbols, b"ABCD".to_vec());

        // The most frequent symbol gets the shortest code.
        let a = table.iter().find(|e| e.symbol == b'A').unwrap();
        assert!(table.iter().all(|e| a.len <= e.len));

        assert_eq!(codec.decode(&encoded).unwrap(), input.to_vec());
    }

    #[test]
    fn test_single_symbol_uses_length_one() {
        let codec = always_compress();
        let input = vec![b'z'; 500];
        let encoded = codec.encode(&input).unwrap();

        let table = table_of(&encoded);
        assert_eq!(
            table,
            vec![CodeEntry {
                symbol: b'z',
                len: 1,
                bits: 0
            }]
        );
        assert_eq!(codec.decode(&encoded).unwrap(), input);
    }

    #[test]
    fn test_small_input_is_stored() {
        let codec = HuffmanCodec::default();
        let input = b"short accident record";
        let encoded = codec.encode(input).unwrap();

        assert_eq!(&encoded[0..4], &STORED_SENTINEL.to_le_bytes());
        assert_eq!(&encoded[4..], input);
        assert_eq!(codec.decode(&encoded).unwrap(), input.to_vec());
    }

    #[test]
    fn test_empty_input_roundtrip() {
        let codec = always_compress();
        let encoded = codec.encode(&[]).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), Vec::<u8>::new());

        let stored = HuffmanCodec::default().encode(&[]).unwrap();
        assert_eq!(HuffmanCodec::default().decode(&stored).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_deterministic_output() {
        let codec = always_compress();
        let input = b"the quick brown fox jumps over the lazy dog, again and again";
        assert_eq!(codec.encode(input).unwrap(), codec.encode(input).unwrap());
    }

    #[test]
    fn test_codes_are_canonical_and_prefix_free() {
        let input: Vec<u8> = (0..2000u32).map(|i| ((i * i) % 37) as u8).collect();
        let table = build_code_table(&input);

        let mut sorted = table.clone();
        sorted.sort_by_key(|e| (e.len, e.symbol));
        for pair in sorted.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let a_extended = u64::from(a.bits) << (b.len - a.len);
            assert!(a_extended < u64::from(b.bits), "{:?} !< {:?}", a, b);
        }
        assert!(build_trie(&table).is_ok());
    }

    #[test]
    fn test_skewed_frequencies_are_length_limited() {
        // Fibonacci-like counts produce a maximally deep tree.
        let mut freqs = [0u64; 256];
        let (mut a, mut b) = (1u64, 1u64);
        for f in freqs.iter_mut().take(40) {
            *f = a;
            let next = a + b;
            a = b;
            b = next;
        }
        assert!(code_lengths(&freqs).iter().any(|&len| len > MAX_CODE_LEN));

        let lengths = limited_lengths(freqs);
        assert!(lengths.iter().all(|&len| len <= MAX_CODE_LEN));
        assert_eq!(lengths.iter().filter(|&&len| len > 0).count(), 40);

        // Kraft sum of a complete prefix code is exactly one.
        let kraft: f64 = lengths
            .iter()
            .filter(|&&len| len > 0)
            .map(|&len| 2f64.powi(-i32::from(len)))
            .sum();
        assert!((kraft - 1.0).abs() < 1e-9);
        assert!(build_trie(&assign_canonical(&lengths)).is_ok());
    }

    #[test]
    fn test_truncated_header_detected() {
        let codec = always_compress();
        let encoded = codec.encode(b"AAAAABBBCCD").unwrap();
        let result = codec.decode(&encoded[..10]);
        assert!(matches!(result, Err(CodecError::TruncatedHeader(_))));

        assert!(matches!(
            codec.decode(&[1, 0]),
            Err(CodecError::TruncatedHeader(_))
        ));
    }

    #[test]
    fn test_missing_stream_bits_is_bad_code() {
        let codec = always_compress();
        let input = b"AAAAABBBCCD".repeat(20);
        let mut encoded = codec.encode(&input).unwrap();

        // Drop the last stream byte but keep the pad byte.
        let pad = encoded.pop().unwrap();
        encoded.pop();
        encoded.push(pad);

        let result = codec.decode(&encoded);
        assert!(matches!(result, Err(CodecError::BadCode { .. })));
    }

    #[test]
    fn test_length_mismatch_on_extra_bits() {
        let codec = always_compress();
        let input = b"AAAAABBBCCD".repeat(20);
        let mut encoded = codec.encode(&input).unwrap();

        // Claim fewer symbols than the stream holds.
        let HuffmanHeader::Coded { stream_start, .. } = parse_header(&encoded).unwrap() else {
            panic!("expected coded header");
        };
        let len_at = stream_start - 4;
        encoded[len_at..stream_start].copy_from_slice(&100u32.to_le_bytes());

        let result = codec.decode(&encoded);
        assert!(matches!(result, Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[b'a', 1, 0, 0, 0, 0]);
        data.extend_from_slice(&[b'a', 1, 1, 0, 0, 0]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0x00);
        data.push(7);

        let result = HuffmanCodec::default().decode(&data);
        assert!(matches!(result, Err(CodecError::InvalidTable(_))));
    }
}
