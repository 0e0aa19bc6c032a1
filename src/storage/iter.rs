//! Lazy frame iterator
//!
//! Each step takes a shared lock, reads one frame and releases the lock,
//! so a long scan never starves the writer. Corrupt frames are skipped and
//! counted; a frame that runs past end-of-file ends the scan with
//! `Truncated`.

use std::fs::File;

use super::errors::{StoreError, StoreResult};
use super::record::{Record, STORE_HEADER_LEN};
use super::store::{file_len, read_frame, read_prefix};
use crate::lock::{FileLock, LockPolicy};
use crate::observability::{log_event_with_fields, Event};

/// Iterator over the frames of a [`RecordStore`](super::RecordStore).
///
/// Yields live and tombstoned records alike; callers filter on
/// [`Record::valid`]. Not restartable.
pub struct RecordIter<'a> {
    file: &'a File,
    lock_policy: LockPolicy,
    watermark: u32,
    pos: u64,
    corrupt_skipped: u64,
    done: bool,
}

impl<'a> RecordIter<'a> {
    pub(super) fn new(file: &'a File, lock_policy: LockPolicy, watermark: u32) -> Self {
        Self {
            file,
            lock_policy,
            watermark,
            pos: STORE_HEADER_LEN,
            corrupt_skipped: 0,
            done: false,
        }
    }

    /// Watermark captured when the iterator was created
    pub fn watermark(&self) -> u32 {
        self.watermark
    }

    /// Corrupt frames skipped so far
    pub fn corrupt_skipped(&self) -> u64 {
        self.corrupt_skipped
    }

    /// Offset of the next frame to read
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn step(&mut self) -> Option<StoreResult<Record>> {
        let _lock = match FileLock::shared(self.file, &self.lock_policy) {
            Ok(lock) => lock,
            Err(e) => return Some(Err(e.into())),
        };
        let len = match file_len(self.file) {
            Ok(len) => len,
            Err(e) => return Some(Err(e)),
        };

        loop {
            if self.pos >= len {
                return None;
            }

            let prefix = match read_prefix(self.file, self.pos, len) {
                Ok(prefix) => prefix,
                Err(e) => return Some(Err(e)),
            };
            if prefix.id > self.watermark {
                log_event_with_fields(
                    Event::StoreUnacknowledgedFrame,
                    &[
                        ("id", &prefix.id.to_string()),
                        ("offset", &self.pos.to_string()),
                        ("watermark", &self.watermark.to_string()),
                    ],
                );
                return None;
            }

            let offset = self.pos;
            match read_frame(self.file, offset, len) {
                Ok(record) => {
                    self.pos += prefix.frame_len();
                    return Some(Ok(record));
                }
                Err(StoreError::CorruptRecord { offset, id }) => {
                    self.corrupt_skipped += 1;
                    self.pos += prefix.frame_len();
                    log_event_with_fields(
                        Event::StoreCorruptRecord,
                        &[("id", &id.to_string()), ("offset", &offset.to_string())],
                    );
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use crate::lock::LockPolicy;
    use crate::storage::{RecordStore, StoreError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_iter_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            RecordStore::open(&temp_dir.path().join("records.db"), LockPolicy::default()).unwrap();
        assert_eq!(store.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_iter_ends_with_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            RecordStore::open(&temp_dir.path().join("records.db"), LockPolicy::default()).unwrap();
        store.append(b"first").unwrap();
        store.append(b"second").unwrap();

        // Chop the last frame in half
        let raw = fs::read(store.path()).unwrap();
        fs::write(store.path(), &raw[..raw.len() - 10]).unwrap();

        let items: Vec<_> = store.iter().unwrap().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().payload, b"first");
        assert!(matches!(items[1], Err(StoreError::Truncated { offset: 50, .. })));
    }

    #[test]
    fn test_iter_hides_frames_appended_later() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            RecordStore::open(&temp_dir.path().join("records.db"), LockPolicy::default()).unwrap();
        store.append(b"early").unwrap();

        let path = store.path().to_path_buf();
        let iter = store.iter().unwrap();
        assert_eq!(iter.watermark(), 1);

        let mut writer = RecordStore::open(&path, LockPolicy::default()).unwrap();
        writer.append(b"late").unwrap();

        let ids: Vec<u32> = iter.map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1]);
    }
}
