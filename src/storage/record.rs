//! Record frame format
//!
//! ```text
//! +------------------+
//! | Record ID        | (u32 LE)
//! +------------------+
//! | Valid Flag       | (u8: 1 = live, 0 = tombstone)
//! +------------------+
//! | Payload Length   | (u32 LE, checksum + payload bytes)
//! +------------------+
//! | SHA-256          | (32 bytes, over the payload only)
//! +------------------+
//! | Payload          | (payload_len - 32 bytes)
//! +------------------+
//! ```
//!
//! The valid flag sits at a fixed offset so a tombstone is a one-byte
//! in-place write that leaves the checksum intact.

use super::checksum::{compute_checksum, verify_checksum, CHECKSUM_LEN};
use super::errors::{StoreError, StoreResult};

/// Size of the `last_id` file header
pub const STORE_HEADER_LEN: u64 = 4;

/// Size of the fixed frame prefix (id, valid, payload_len)
pub const FRAME_PREFIX_LEN: usize = 9;

/// Offset of the valid flag within a frame
pub const VALID_FLAG_OFFSET: u64 = 4;

/// A record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Store-assigned id
    pub id: u32,
    /// Byte offset of the frame
    pub offset: u64,
    /// False once tombstoned
    pub valid: bool,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Record {
    /// Returns whether the record is live
    pub fn is_live(&self) -> bool {
        self.valid
    }

    /// Total frame size on disk
    pub fn frame_len(&self) -> u64 {
        FRAME_PREFIX_LEN as u64 + CHECKSUM_LEN as u64 + self.payload.len() as u64
    }
}

/// Fixed-size frame prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrefix {
    /// Record id
    pub id: u32,
    /// Raw valid flag
    pub valid: bool,
    /// Checksum plus payload length
    pub payload_len: u32,
}

impl FramePrefix {
    /// Parse the 9-byte prefix
    pub fn parse(buf: &[u8; FRAME_PREFIX_LEN]) -> Self {
        Self {
            id: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            valid: buf[4] != 0,
            payload_len: u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
        }
    }

    /// Total frame length, prefix included
    pub fn frame_len(&self) -> u64 {
        FRAME_PREFIX_LEN as u64 + self.payload_len as u64
    }
}

/// Serialize a live frame for `payload`.
pub fn encode_frame(id: u32, payload: &[u8]) -> StoreResult<Vec<u8>> {
    let body_len = payload.len() as u64 + CHECKSUM_LEN as u64;
    if body_len > u32::MAX as u64 {
        return Err(StoreError::PayloadTooLarge(payload.len() as u64));
    }

    let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + body_len as usize);
    frame.extend_from_slice(&id.to_le_bytes());
    frame.push(1);
    frame.extend_from_slice(&(body_len as u32).to_le_bytes());
    frame.extend_from_slice(&compute_checksum(payload));
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Verify and decode a frame body (checksum + payload) read at `offset`.
pub fn decode_frame(prefix: &FramePrefix, offset: u64, body: &[u8]) -> StoreResult<Record> {
    let corrupt = || StoreError::CorruptRecord {
        offset,
        id: prefix.id,
    };

    if body.len() != prefix.payload_len as usize || body.len() < CHECKSUM_LEN {
        return Err(corrupt());
    }

    let (checksum, payload) = body.split_at(CHECKSUM_LEN);
    if !verify_checksum(payload, checksum) {
        return Err(corrupt());
    }

    Ok(Record {
        id: prefix.id,
        offset,
        valid: prefix.valid,
        payload: payload.to_vec(),
    })
}
