//! Extendible hash index over two files
//!
//! The directory lives at `path`, bucket pages in `path.bkt` behind a
//! 4-byte capacity header. Every operation locks the directory file
//! (shared for lookups, exclusive for writes) and rereads whatever
//! directory state it needs, so nothing is cached across calls.
//!
//! Writes that change the structure land in a fixed order: new bucket,
//! directory, old bucket, each fsynced before the next.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::bucket::{depth_mask, page_size, Bucket, Upsert};
use super::directory::{
    encoded_len, global_depth_from, slot_for, slot_offset, Directory, DIRECTORY_HEADER_LEN,
    MAX_GLOBAL_DEPTH, NO_BUCKET,
};
use super::errors::{IndexError, IndexResult};
use crate::lock::{FileLock, LockPolicy};
use crate::observability::{log_event_with_fields, Event};

/// Bytes before the first bucket page
const BUCKET_FILE_HEADER_LEN: u64 = 4;

/// Index tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Entries per bucket page
    pub bucket_capacity: u32,
    /// Largest global depth a split may reach
    pub max_global_depth: u32,
    /// Lock retry behaviour
    pub lock_policy: LockPolicy,
}

impl IndexConfig {
    /// Default entries per bucket
    pub const DEFAULT_BUCKET_CAPACITY: u32 = 31;
    /// Default global depth limit
    pub const DEFAULT_MAX_GLOBAL_DEPTH: u32 = 20;

    /// Default config with a different bucket capacity
    pub fn with_capacity(bucket_capacity: u32) -> Self {
        Self {
            bucket_capacity,
            ..Self::default()
        }
    }

    /// Rejects capacities below 2 and depth limits outside 1..=32
    pub fn validate(&self) -> IndexResult<()> {
        if self.bucket_capacity < 2 {
            return Err(IndexError::InvalidConfig(format!(
                "bucket_capacity must be at least 2, got {}",
                self.bucket_capacity
            )));
        }
        if self.max_global_depth == 0 || self.max_global_depth > MAX_GLOBAL_DEPTH {
            return Err(IndexError::InvalidConfig(format!(
                "max_global_depth must be in 1..={}, got {}",
                MAX_GLOBAL_DEPTH, self.max_global_depth
            )));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: Self::DEFAULT_BUCKET_CAPACITY,
            max_global_depth: Self::DEFAULT_MAX_GLOBAL_DEPTH,
            lock_policy: LockPolicy::default(),
        }
    }
}

/// Structural summary returned by [`HashIndex::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Current global depth
    pub global_depth: u32,
    /// Directory slots
    pub slots: u64,
    /// Slots with no bucket yet
    pub empty_slots: u64,
    /// Distinct buckets
    pub buckets: u64,
    /// Stored keys
    pub entries: u64,
    /// Deepest bucket
    pub max_local_depth: u32,
}

/// Extendible hash index mapping `u32` keys to `u64` values
#[derive(Debug)]
pub struct HashIndex {
    dir_path: PathBuf,
    bucket_path: PathBuf,
    dir_file: File,
    bucket_file: File,
    config: IndexConfig,
}

impl HashIndex {
    /// Opens or creates the index at `path` (plus `path.bkt`).
    pub fn open(path: &Path, config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;

        let bucket_path = bucket_path_for(path);
        let dir_file = open_rw(path)?;
        let bucket_file = open_rw(&bucket_path)?;

        let index = Self {
            dir_path: path.to_path_buf(),
            bucket_path,
            dir_file,
            bucket_file,
            config,
        };

        let global_depth = {
            let _lock = FileLock::exclusive(&index.dir_file, &config.lock_policy)?;
            index.init_bucket_file()?;
            if file_len(&index.dir_file, "directory")? == 0 {
                write_at(&index.dir_file, 0, &Directory::new().encode(), "directory")?;
                sync(&index.dir_file, "directory")?;
            }
            index.load_directory()?.global_depth
        };

        log_event_with_fields(
            Event::IndexOpen,
            &[
                ("bucket_capacity", &config.bucket_capacity.to_string()),
                ("global_depth", &global_depth.to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(index)
    }

    /// Directory file path
    pub fn path(&self) -> &Path {
        &self.dir_path
    }

    /// Bucket file path
    pub fn bucket_path(&self) -> &Path {
        &self.bucket_path
    }

    /// Active configuration
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Current global depth, read from disk
    pub fn global_depth(&self) -> IndexResult<u32> {
        let _lock = FileLock::shared(&self.dir_file, &self.config.lock_policy)?;
        self.read_global_depth()
    }

    /// Value stored for `key`
    pub fn get(&self, key: u32) -> IndexResult<Option<u64>> {
        let _lock = FileLock::shared(&self.dir_file, &self.config.lock_policy)?;
        let slot = slot_for(key, self.read_global_depth()?);
        let bucket_offset = self.read_slot(slot)?;
        if bucket_offset == NO_BUCKET {
            return Ok(None);
        }
        Ok(self.read_bucket(bucket_offset)?.get(key))
    }

    /// Returns whether `key` is present
    pub fn contains(&self, key: u32) -> IndexResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts `key`, overwriting any previous value. Splits full buckets
    /// (doubling the directory when needed) until the key fits.
    ///
    /// Only the key's slot is read unless the bucket has to be created or
    /// split; those load the whole directory.
    pub fn put(&mut self, key: u32, value: u64) -> IndexResult<()> {
        let _lock = FileLock::exclusive(&self.dir_file, &self.config.lock_policy)?;
        let capacity = self.config.bucket_capacity;

        loop {
            let slot = slot_for(key, self.read_global_depth()?);
            let bucket_offset = self.read_slot(slot)?;

            if bucket_offset == NO_BUCKET {
                let mut directory = self.load_directory()?;
                return self.create_bucket(&mut directory, slot, key, value);
            }

            let mut bucket = self.read_bucket(bucket_offset)?;
            if bucket.upsert(key, value, capacity) != Upsert::Full {
                return self.write_bucket(bucket_offset, &bucket);
            }

            let mut directory = self.load_directory()?;
            self.split(&mut directory, bucket_offset, bucket, key)?;
        }
    }

    /// Every `(key, value)` pair, sorted by key
    pub fn entries(&self) -> IndexResult<Vec<(u32, u64)>> {
        let _lock = FileLock::shared(&self.dir_file, &self.config.lock_policy)?;
        let directory = self.load_directory()?;

        let mut all = BTreeMap::new();
        let offsets: BTreeSet<u64> = directory
            .slots
            .iter()
            .copied()
            .filter(|o| *o != NO_BUCKET)
            .collect();
        for offset in offsets {
            for (key, value) in self.read_bucket(offset)?.entries {
                all.insert(key, value);
            }
        }
        Ok(all.into_iter().collect())
    }

    /// Number of stored keys
    pub fn len(&self) -> IndexResult<usize> {
        Ok(self.entries()?.len())
    }

    /// Returns whether the index holds no keys
    pub fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops every bucket and resets the directory to depth 1.
    pub fn clear(&mut self) -> IndexResult<()> {
        let _lock = FileLock::exclusive(&self.dir_file, &self.config.lock_policy)?;

        let fresh = Directory::new().encode();
        self.dir_file
            .set_len(fresh.len() as u64)
            .map_err(|e| IndexError::io("Failed to truncate directory", e))?;
        write_at(&self.dir_file, 0, &fresh, "directory")?;
        sync(&self.dir_file, "directory")?;

        self.bucket_file
            .set_len(BUCKET_FILE_HEADER_LEN)
            .map_err(|e| IndexError::io("Failed to truncate bucket file", e))?;
        sync(&self.bucket_file, "bucket file")
    }

    /// Checks every structural invariant and returns a summary.
    ///
    /// For each bucket: its local depth is at most the global depth, it is
    /// referenced by exactly the `2^(gd - ld)` slots sharing its signature,
    /// and every key it holds carries that signature. Keys are unique
    /// across buckets.
    pub fn verify(&self) -> IndexResult<IndexStats> {
        let _lock = FileLock::shared(&self.dir_file, &self.config.lock_policy)?;
        let directory = self.load_directory()?;
        let gd = directory.global_depth;

        let mut stats = IndexStats {
            global_depth: gd,
            slots: directory.slots.len() as u64,
            ..IndexStats::default()
        };

        let mut referencing: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (slot, offset) in directory.slots.iter().enumerate() {
            if *offset == NO_BUCKET {
                stats.empty_slots += 1;
            } else {
                referencing.entry(*offset).or_default().push(slot);
            }
        }

        let mut seen_keys = BTreeSet::new();
        for (offset, slots) in &referencing {
            let bucket = self.read_bucket(*offset)?;
            let ld = bucket.local_depth;
            if ld > gd {
                return Err(IndexError::InvariantViolation(format!(
                    "bucket at {} has local depth {} above global depth {}",
                    offset, ld, gd
                )));
            }

            let mask = depth_mask(ld);
            let signature = slots[0] as u64 & mask;
            let expected_refs = 1usize << (gd - ld);
            if slots.len() != expected_refs
                || slots.iter().any(|s| *s as u64 & mask != signature)
            {
                return Err(IndexError::InvariantViolation(format!(
                    "bucket at {} (depth {}) is referenced by slots {:?}",
                    offset, ld, slots
                )));
            }

            for (key, _) in &bucket.entries {
                if *key as u64 & mask != signature {
                    return Err(IndexError::InvariantViolation(format!(
                        "key {} in bucket at {} does not match signature {:b}",
                        key, offset, signature
                    )));
                }
                if !seen_keys.insert(*key) {
                    return Err(IndexError::InvariantViolation(format!(
                        "key {} stored twice",
                        key
                    )));
                }
            }

            stats.buckets += 1;
            stats.entries += bucket.entries.len() as u64;
            stats.max_local_depth = stats.max_local_depth.max(ld);
        }

        Ok(stats)
    }

    /// Creates the bucket for the empty `slot` holding `(key, value)`.
    ///
    /// The bucket takes the shallowest depth whose sibling slots are all
    /// empty and is pointed at from every one of them, so the directory
    /// never holds an empty slot beside a bucket that could have covered
    /// it.
    fn create_bucket(
        &self,
        directory: &mut Directory,
        slot: usize,
        key: u32,
        value: u64,
    ) -> IndexResult<()> {
        let depth = directory.shallowest_free_depth(slot);
        let mut bucket = Bucket::new(depth);
        bucket.upsert(key, value, self.config.bucket_capacity);

        let offset = self.append_bucket(&bucket)?;
        directory.assign(slot as u64 & depth_mask(depth), depth, offset);
        self.write_directory(directory)
    }

    /// Splits the full bucket at `old_offset`, which `key` could not enter.
    fn split(
        &self,
        directory: &mut Directory,
        old_offset: u64,
        mut old: Bucket,
        key: u32,
    ) -> IndexResult<()> {
        let depth = old.local_depth;
        if depth >= directory.global_depth {
            if directory.global_depth >= self.config.max_global_depth {
                return Err(IndexError::DepthExceeded {
                    max: self.config.max_global_depth,
                });
            }
            directory.double();
            log_event_with_fields(
                Event::IndexDirectoryDoubled,
                &[("global_depth", &directory.global_depth.to_string())],
            );
        }

        let signature = key as u64 & depth_mask(depth);
        let new = old.split_off(depth);

        let new_offset = self.append_bucket(&new)?;
        directory.reroute(signature, depth, new_offset);
        self.write_directory(directory)?;
        self.write_bucket(old_offset, &old)?;

        log_event_with_fields(
            Event::IndexSplit,
            &[
                ("local_depth", &(depth + 1).to_string()),
                ("new_offset", &new_offset.to_string()),
                ("old_offset", &old_offset.to_string()),
            ],
        );
        Ok(())
    }

    fn init_bucket_file(&self) -> IndexResult<()> {
        let expected = self.config.bucket_capacity;
        let len = file_len(&self.bucket_file, "bucket file")?;
        if len == 0 {
            write_at(&self.bucket_file, 0, &expected.to_le_bytes(), "bucket file header")?;
            return sync(&self.bucket_file, "bucket file");
        }
        if len < BUCKET_FILE_HEADER_LEN {
            return Err(IndexError::CorruptHeader(format!(
                "bucket file is {} bytes, header needs {}",
                len, BUCKET_FILE_HEADER_LEN
            )));
        }

        let mut raw = [0u8; 4];
        read_at(&self.bucket_file, 0, &mut raw, "bucket file header")?;
        let found = u32::from_le_bytes(raw);
        if found != expected {
            return Err(IndexError::CapacityMismatch { expected, found });
        }
        Ok(())
    }

    fn read_global_depth(&self) -> IndexResult<u32> {
        let mut raw = [0u8; DIRECTORY_HEADER_LEN];
        read_at(&self.dir_file, 0, &mut raw, "directory header")?;
        let depth = global_depth_from(&raw)?;

        let len = file_len(&self.dir_file, "directory")?;
        if len != encoded_len(depth) {
            return Err(IndexError::CorruptHeader(format!(
                "directory is {} bytes for global depth {}",
                len, depth
            )));
        }
        Ok(depth)
    }

    fn read_slot(&self, slot: usize) -> IndexResult<u64> {
        let mut raw = [0u8; 8];
        read_at(&self.dir_file, slot_offset(slot), &mut raw, "directory slot")?;
        Ok(u64::from_le_bytes(raw))
    }

    fn load_directory(&self) -> IndexResult<Directory> {
        let len = file_len(&self.dir_file, "directory")?;
        let mut data = vec![0u8; len as usize];
        read_at(&self.dir_file, 0, &mut data, "directory")?;
        Directory::decode(&data)
    }

    fn write_directory(&self, directory: &Directory) -> IndexResult<()> {
        write_at(&self.dir_file, 0, &directory.encode(), "directory")?;
        sync(&self.dir_file, "directory")
    }

    fn read_bucket(&self, offset: u64) -> IndexResult<Bucket> {
        let page_len = page_size(self.config.bucket_capacity) as u64;
        let len = file_len(&self.bucket_file, "bucket file")?;
        if offset < BUCKET_FILE_HEADER_LEN
            || (offset - BUCKET_FILE_HEADER_LEN) % page_len != 0
            || offset + page_len > len
        {
            return Err(IndexError::corrupt_bucket(
                offset,
                "directory slot does not point at a bucket page",
            ));
        }

        let mut page = vec![0u8; page_len as usize];
        read_at(&self.bucket_file, offset, &mut page, "bucket")?;
        Bucket::decode(&page, offset, self.config.bucket_capacity)
    }

    fn write_bucket(&self, offset: u64, bucket: &Bucket) -> IndexResult<()> {
        write_at(
            &self.bucket_file,
            offset,
            &bucket.encode(self.config.bucket_capacity),
            "bucket",
        )?;
        sync(&self.bucket_file, "bucket file")
    }

    fn append_bucket(&self, bucket: &Bucket) -> IndexResult<u64> {
        let offset = file_len(&self.bucket_file, "bucket file")?;
        self.write_bucket(offset, bucket)?;
        Ok(offset)
    }
}

fn bucket_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bkt");
    PathBuf::from(name)
}

fn open_rw(path: &Path) -> IndexResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| IndexError::io(format!("Failed to open index file: {}", path.display()), e))
}

fn file_len(file: &File, what: &str) -> IndexResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| IndexError::io(format!("Failed to read {} metadata", what), e))
}

fn read_at(mut file: &File, offset: u64, buf: &mut [u8], what: &str) -> IndexResult<()> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buf))
        .map_err(|e| IndexError::io(format!("Failed to read {} at offset {}", what, offset), e))
}

fn write_at(mut file: &File, offset: u64, data: &[u8], what: &str) -> IndexResult<()> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(data))
        .map_err(|e| IndexError::io(format!("Failed to write {} at offset {}", what, offset), e))
}

fn sync(file: &File, what: &str) -> IndexResult<()> {
    file.sync_all()
        .map_err(|e| IndexError::io(format!("fsync failed on {}", what), e))
}
