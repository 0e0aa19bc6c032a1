//! Hash directory
//!
//! ```text
//! u32 global_depth | u64 bucket_offset x 2^global_depth
//! ```
//!
//! A slot offset of 0 means no bucket has been created for that slot yet;
//! real buckets live at offset 4 or later in the bucket file.

use super::bucket::depth_mask;
use super::errors::{IndexError, IndexResult};

/// Bytes before the slot table
pub const DIRECTORY_HEADER_LEN: usize = 4;

/// Slot value meaning "no bucket yet"
pub const NO_BUCKET: u64 = 0;

/// Depth of a fresh directory
pub const INITIAL_GLOBAL_DEPTH: u32 = 1;

/// Hard ceiling on global depth (keys are 32 bits)
pub const MAX_GLOBAL_DEPTH: u32 = 32;

/// In-memory copy of the directory file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Number of low key bits used to pick a slot
    pub global_depth: u32,
    /// Bucket offset per slot
    pub slots: Vec<u64>,
}

impl Directory {
    /// Fresh directory: depth 1, two empty slots
    pub fn new() -> Self {
        Self {
            global_depth: INITIAL_GLOBAL_DEPTH,
            slots: vec![NO_BUCKET; 1 << INITIAL_GLOBAL_DEPTH],
        }
    }

    /// Doubles the directory; slot `i + size` starts as a copy of slot `i`.
    pub fn double(&mut self) {
        let copy = self.slots.clone();
        self.slots.extend(copy);
        self.global_depth += 1;
    }

    /// Points every slot sharing `signature` in the low `depth` bits and
    /// having bit `depth` set at `new_offset`.
    pub fn reroute(&mut self, signature: u64, depth: u32, new_offset: u64) -> usize {
        let mask = depth_mask(depth);
        let mut moved = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let i = i as u64;
            if i & mask == signature && (i >> depth) & 1 == 1 {
                *slot = new_offset;
                moved += 1;
            }
        }
        moved
    }

    /// Shallowest depth at which every slot sharing the low bits of `slot`
    /// is still empty. A bucket created there covers all of them.
    pub fn shallowest_free_depth(&self, slot: usize) -> u32 {
        (0..self.global_depth)
            .find(|&depth| {
                let mask = depth_mask(depth);
                let signature = slot as u64 & mask;
                self.slots
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i as u64 & mask == signature)
                    .all(|(_, offset)| *offset == NO_BUCKET)
            })
            .unwrap_or(self.global_depth)
    }

    /// Points every slot whose low `depth` bits equal `signature` at
    /// `offset`. Returns how many slots changed.
    pub fn assign(&mut self, signature: u64, depth: u32, offset: u64) -> usize {
        let mask = depth_mask(depth);
        let mut assigned = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i as u64 & mask == signature {
                *slot = offset;
                assigned += 1;
            }
        }
        assigned
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DIRECTORY_HEADER_LEN + self.slots.len() * 8);
        buf.extend_from_slice(&self.global_depth.to_le_bytes());
        for offset in &self.slots {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        buf
    }

    /// Parse the directory file contents
    pub fn decode(data: &[u8]) -> IndexResult<Self> {
        let global_depth = global_depth_from(data)?;
        let expected = encoded_len(global_depth);
        if data.len() as u64 != expected {
            return Err(IndexError::CorruptHeader(format!(
                "directory is {} bytes, depth {} needs {}",
                data.len(),
                global_depth,
                expected
            )));
        }

        let slots = data[DIRECTORY_HEADER_LEN..]
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect();

        Ok(Self {
            global_depth,
            slots,
        })
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot for `key` at `global_depth`
pub fn slot_for(key: u32, global_depth: u32) -> usize {
    (key as u64 & depth_mask(global_depth)) as usize
}

/// File offset of slot `slot`
pub fn slot_offset(slot: usize) -> u64 {
    DIRECTORY_HEADER_LEN as u64 + slot as u64 * 8
}

/// Directory file length at `global_depth`
pub fn encoded_len(global_depth: u32) -> u64 {
    DIRECTORY_HEADER_LEN as u64 + (1u64 << global_depth) * 8
}

/// Reads and range-checks the depth field
pub fn global_depth_from(data: &[u8]) -> IndexResult<u32> {
    if data.len() < DIRECTORY_HEADER_LEN {
        return Err(IndexError::CorruptHeader(format!(
            "directory is {} bytes, header needs {}",
            data.len(),
            DIRECTORY_HEADER_LEN
        )));
    }
    let depth = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if depth == 0 || depth > MAX_GLOBAL_DEPTH {
        return Err(IndexError::CorruptHeader(format!(
            "global depth {} out of range",
            depth
        )));
    }
    Ok(depth)
}
