//! Fixed-size bucket pages
//!
//! ```text
//! u32 entry_count | u32 local_depth | (u32 key, u64 offset) x entry_count | zero padding
//! ```
//!
//! Every page is `8 + 12 * capacity` bytes so a bucket can be rewritten in
//! place.

use super::errors::{IndexError, IndexResult};

/// Bytes before the entry table
pub const BUCKET_HEADER_LEN: usize = 8;

/// Bytes per `(key, offset)` entry
pub const ENTRY_LEN: usize = 12;

/// Page size for a bucket holding `capacity` entries
pub fn page_size(capacity: u32) -> usize {
    BUCKET_HEADER_LEN + ENTRY_LEN * capacity as usize
}

/// Low-bit mask of width `depth`
pub fn depth_mask(depth: u32) -> u64 {
    if depth >= 64 {
        u64::MAX
    } else {
        (1u64 << depth) - 1
    }
}

/// One bucket page in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Number of low key bits shared by every entry
    pub local_depth: u32,
    /// `(key, value)` pairs in insertion order
    pub entries: Vec<(u32, u64)>,
}

/// Outcome of [`Bucket::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Existing key overwritten
    Replaced,
    /// New key appended
    Inserted,
    /// Key absent and no room left
    Full,
}

impl Bucket {
    /// Empty bucket at `local_depth`
    pub fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }

    /// Value stored for `key`
    pub fn get(&self, key: u32) -> Option<u64> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Overwrite or append `(key, value)` if there is room.
    pub fn upsert(&mut self, key: u32, value: u64, capacity: u32) -> Upsert {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return Upsert::Replaced;
        }
        if self.entries.len() >= capacity as usize {
            return Upsert::Full;
        }
        self.entries.push((key, value));
        Upsert::Inserted
    }

    /// Moves every entry with bit `bit` set into a new bucket; both end
    /// up at depth `bit + 1`.
    pub fn split_off(&mut self, bit: u32) -> Bucket {
        let (high, low): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|(k, _)| (*k as u64 >> bit) & 1 == 1);
        self.entries = low;
        self.local_depth = bit + 1;
        Bucket {
            local_depth: bit + 1,
            entries: high,
        }
    }

    /// Serialize to a full page
    pub fn encode(&self, capacity: u32) -> Vec<u8> {
        let mut page = vec![0u8; page_size(capacity)];
        page[0..4].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        page[4..8].copy_from_slice(&self.local_depth.to_le_bytes());
        for (i, (key, value)) in self.entries.iter().enumerate() {
            let at = BUCKET_HEADER_LEN + i * ENTRY_LEN;
            page[at..at + 4].copy_from_slice(&key.to_le_bytes());
            page[at + 4..at + 12].copy_from_slice(&value.to_le_bytes());
        }
        page
    }

    /// Parse a page read from `offset`
    pub fn decode(page: &[u8], offset: u64, capacity: u32) -> IndexResult<Self> {
        if page.len() != page_size(capacity) {
            return Err(IndexError::corrupt_bucket(
                offset,
                format!("page is {} bytes, expected {}", page.len(), page_size(capacity)),
            ));
        }

        let count = u32::from_le_bytes([page[0], page[1], page[2], page[3]]);
        let local_depth = u32::from_le_bytes([page[4], page[5], page[6], page[7]]);
        if count > capacity {
            return Err(IndexError::corrupt_bucket(
                offset,
                format!("entry count {} exceeds capacity {}", count, capacity),
            ));
        }
        if local_depth > 32 {
            return Err(IndexError::corrupt_bucket(
                offset,
                format!("local depth {} out of range", local_depth),
            ));
        }

        let entries = (0..count as usize)
            .map(|i| {
                let at = BUCKET_HEADER_LEN + i * ENTRY_LEN;
                let key = u32::from_le_bytes([page[at], page[at + 1], page[at + 2], page[at + 3]]);
                let mut value = [0u8; 8];
                value.copy_from_slice(&page[at + 4..at + 12]);
                (key, u64::from_le_bytes(value))
            })
            .collect();

        Ok(Self {
            local_depth,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        assert_eq!(page_size(31), 380);
        assert_eq!(page_size(2), 32);
    }

    #[test]
    fn test_upsert_outcomes() {
        let mut bucket = Bucket::new(1);
        assert_eq!(bucket.upsert(1, 10, 2), Upsert::Inserted);
        assert_eq!(bucket.upsert(3, 30, 2), Upsert::Inserted);
        assert_eq!(bucket.upsert(1, 11, 2), Upsert::Replaced);
        assert_eq!(bucket.upsert(5, 50, 2), Upsert::Full);
        assert_eq!(bucket.get(1), Some(11));
        assert_eq!(bucket.get(5), None);
    }

    #[test]
    fn test_split_off_by_bit() {
        let mut bucket = Bucket::new(1);
        for key in [1u32, 3, 5, 7] {
            bucket.entries.push((key, key as u64));
        }
        let high = bucket.split_off(1);
        assert_eq!(bucket.local_depth, 2);
        assert_eq!(high.local_depth, 2);
        assert_eq!(bucket.entries, vec![(1, 1), (5, 5)]);
        assert_eq!(high.entries, vec![(3, 3), (7, 7)]);
    }

    #[test]
    fn test_page_layout() {
        let mut bucket = Bucket::new(2);
        bucket.upsert(9, 0x0102, 2);
        let page = bucket.encode(2);
        assert_eq!(page.len(), 32);
        assert_eq!(&page[0..4], &[1, 0, 0, 0]);
        assert_eq!(&page[4..8], &[2, 0, 0, 0]);
        assert_eq!(&page[8..12], &[9, 0, 0, 0]);
        assert_eq!(&page[12..20], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert!(page[20..].iter().all(|b| *b == 0));
        assert_eq!(Bucket::decode(&page, 4, 2).unwrap(), bucket);
    }

    #[test]
    fn test_decode_rejects_overfull_page() {
        let mut page = Bucket::new(1).encode(2);
        page[0] = 3;
        assert!(matches!(
            Bucket::decode(&page, 36, 2),
            Err(IndexError::CorruptBucket { offset: 36, .. })
        ));
    }

    #[test]
    fn test_depth_mask() {
        assert_eq!(depth_mask(0), 0);
        assert_eq!(depth_mask(3), 0b111);
        assert_eq!(depth_mask(32), u32::MAX as u64);
    }
}
