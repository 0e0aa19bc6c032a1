//! Variable-width LZW codec
//!
//! Compressed layout:
//!
//! ```text
//! +----------------------+
//! | num_codes (u32 BE)   |
//! +----------------------+
//! | start_width (u8)     |
//! +----------------------+
//! | codes, MSB-first     |  width grows from start_width up to max_width
//! +----------------------+
//! ```
//!
//! Codes 0–255 are single bytes. After every emitted code (except the last)
//! the encoder inserts one dictionary entry; once the next code to assign
//! equals `2^width` the width grows by one bit. There is no clear code: a
//! full dictionary is either frozen or reported, per [`CapPolicy`].

use std::collections::HashMap;

use super::errors::{CodecError, CodecResult};
use super::Codec;
use crate::bitio::{BitReader, BitWriter};

/// Width of the first code
pub const MIN_WIDTH: u8 = 9;

/// Default (and largest supported) code width
pub const DEFAULT_MAX_WIDTH: u8 = 24;

const HEADER_BYTES: usize = 5;
const FIRST_FREE_CODE: u32 = 256;
const NO_PREFIX: u32 = u32::MAX;

/// What happens when the dictionary reaches `2^max_width` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
    /// Stop adding entries; keep coding with the full table
    #[default]
    Freeze,
    /// Fail with `OverflowBeyondCap`
    Fail,
}

/// LZW codec settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzwConfig {
    /// Largest code width (9..=24)
    pub max_width: u8,
    /// Behaviour once the dictionary is full
    pub cap_policy: CapPolicy,
}

impl Default for LzwConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            cap_policy: CapPolicy::Freeze,
        }
    }
}

impl LzwConfig {
    fn validate(&self) -> CodecResult<()> {
        if !(MIN_WIDTH..=DEFAULT_MAX_WIDTH).contains(&self.max_width) {
            return Err(CodecError::InvalidWidth {
                width: self.max_width,
                min: MIN_WIDTH,
                max: DEFAULT_MAX_WIDTH,
            });
        }
        Ok(())
    }

    fn dictionary_limit(&self) -> u32 {
        1u32 << self.max_width
    }
}

/// Tracks the encoder's `next_code` and current width.
///
/// The decoder runs an identical counter so both sides switch widths on
/// the same code even though the decoder's dictionary lags one entry behind.
#[derive(Debug)]
struct WidthSchedule {
    next_code: u32,
    width: u8,
    limit: u32,
    max_width: u8,
    policy: CapPolicy,
}

impl WidthSchedule {
    fn new(start_width: u8, config: &LzwConfig) -> Self {
        Self {
            next_code: FIRST_FREE_CODE,
            width: start_width,
            limit: config.dictionary_limit(),
            max_width: config.max_width,
            policy: config.cap_policy,
        }
    }

    /// Records one insertion attempt. Returns the assigned code, or `None`
    /// when the dictionary is frozen.
    fn assign(&mut self) -> CodecResult<Option<u32>> {
        if self.next_code >= self.limit {
            return match self.policy {
                CapPolicy::Freeze => Ok(None),
                CapPolicy::Fail => Err(CodecError::OverflowBeyondCap {
                    max_width: self.max_width,
                }),
            };
        }
        let code = self.next_code;
        self.next_code += 1;
        if self.next_code == 1u32 << self.width && self.width < self.max_width {
            self.width += 1;
        }
        Ok(Some(code))
    }
}

/// Decoder dictionary entry, stored as a prefix chain.
#[derive(Debug, Clone, Copy)]
struct Entry {
    prefix: u32,
    byte: u8,
    first: u8,
}

/// LZW encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct LzwCodec {
    config: LzwConfig,
}

impl LzwCodec {
    /// Create a codec with the given settings
    pub fn new(config: LzwConfig) -> Self {
        Self { config }
    }

    /// Returns the codec settings
    pub fn config(&self) -> &LzwConfig {
        &self.config
    }

    /// Compresses `data`.
    pub fn encode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        self.config.validate()?;

        let mut header = Vec::with_capacity(HEADER_BYTES);
        header.extend_from_slice(&0u32.to_be_bytes());
        header.push(MIN_WIDTH);
        let mut writer = BitWriter::with_prefix(header);

        let mut schedule = WidthSchedule::new(MIN_WIDTH, &self.config);
        let mut dict: HashMap<(u32, u8), u32> = HashMap::new();
        let mut num_codes: u32 = 0;
        let mut w: Option<u32> = None;

        for &c in data {
            let Some(prefix) = w else {
                w = Some(u32::from(c));
                continue;
            };
            if let Some(&code) = dict.get(&(prefix, c)) {
                w = Some(code);
                continue;
            }

            writer.write_bits(prefix, schedule.width);
            num_codes = bump_count(num_codes, data.len())?;
            if let Some(code) = schedule.assign()? {
                dict.insert((prefix, c), code);
            }
            w = Some(u32::from(c));
        }

        if let Some(prefix) = w {
            writer.write_bits(prefix, schedule.width);
            num_codes = bump_count(num_codes, data.len())?;
        }

        let mut out = writer.into_bytes();
        out[0..4].copy_from_slice(&num_codes.to_be_bytes());
        Ok(out)
    }

    /// Reads the packed code sequence of a compressed buffer without
    /// expanding it.
    pub fn read_codes(&self, data: &[u8]) -> CodecResult<Vec<u32>> {
        self.config.validate()?;

        if data.len() < HEADER_BYTES {
            return Err(CodecError::TruncatedStream {
                expected: 0,
                read: 0,
            });
        }
        let num_codes = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let start_width = data[4];
        if start_width < MIN_WIDTH || start_width > self.config.max_width {
            return Err(CodecError::InvalidWidth {
                width: start_width,
                min: MIN_WIDTH,
                max: self.config.max_width,
            });
        }

        let mut reader = BitReader::new(&data[HEADER_BYTES..]);
        let mut schedule = WidthSchedule::new(start_width, &self.config);
        let capacity = (num_codes as u64).min(reader.remaining_bits() / u64::from(MIN_WIDTH));
        let mut codes = Vec::with_capacity(capacity as usize);

        for read in 0..num_codes {
            if read > 0 {
                schedule.assign()?;
            }
            let code = reader
                .read_bits(schedule.width)
                .ok_or(CodecError::TruncatedStream {
                    expected: num_codes,
                    read,
                })?;
            codes.push(code);
        }
        Ok(codes)
    }

    /// Decompresses a buffer produced by [`LzwCodec::encode`].
    pub fn decode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        let codes = self.read_codes(data)?;
        let Some((&first, rest)) = codes.split_first() else {
            return Ok(Vec::new());
        };

        let limit = self.config.dictionary_limit();
        let mut entries: Vec<Entry> = (0..=255u8)
            .map(|b| Entry {
                prefix: NO_PREFIX,
                byte: b,
                first: b,
            })
            .collect();

        if first >= FIRST_FREE_CODE {
            return Err(CodecError::BadCompressedCode {
                code: first,
                next_code: FIRST_FREE_CODE,
            });
        }

        let mut out = Vec::with_capacity(codes.len() * 2);
        let mut scratch = Vec::new();
        out.push(first as u8);
        let mut w = first;

        for &code in rest {
            let next_code = entries.len() as u32;
            let first_byte = if code < next_code {
                expand(&entries, code, &mut scratch);
                out.extend_from_slice(&scratch);
                entries[code as usize].first
            } else if code == next_code && next_code < limit {
                // KwKwK: the code being defined is w + w[0].
                expand(&entries, w, &mut scratch);
                let head = entries[w as usize].first;
                out.extend_from_slice(&scratch);
                out.push(head);
                head
            } else {
                return Err(CodecError::BadCompressedCode { code, next_code });
            };

            if next_code < limit {
                entries.push(Entry {
                    prefix: w,
                    byte: first_byte,
                    first: entries[w as usize].first,
                });
            }
            w = code;
        }
        Ok(out)
    }
}

impl Codec for LzwCodec {
    fn name(&self) -> &'static str {
        "lzw"
    }

    fn encode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        LzwCodec::encode(self, data)
    }

    fn decode(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        LzwCodec::decode(self, data)
    }
}

fn bump_count(count: u32, input_len: usize) -> CodecResult<u32> {
    count
        .checked_add(1)
        .ok_or(CodecError::InputTooLarge(input_len as u64))
}

/// Writes the bytes of `code` into `buf` (cleared first).
fn expand(entries: &[Entry], code: u32, buf: &mut Vec<u8>) {
    buf.clear();
    let mut cursor = code;
    loop {
        let entry = entries[cursor as usize];
        buf.push(entry.byte);
        if entry.prefix == NO_PREFIX {
            break;
        }
        cursor = entry.prefix;
    }
    buf.reverse();
}
