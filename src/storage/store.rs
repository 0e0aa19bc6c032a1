//! Append-only record store
//!
//! The file starts with a 4-byte `last_id` watermark followed by frames.
//! Writes follow one ordering rule: a frame is written and fsynced before
//! the header is advanced, so a reader that sees `last_id = N` will find
//! every frame with id <= N. Bytes past the last acknowledged frame are
//! leftovers of an interrupted append. Scans stop at them, the next append
//! cuts them off before writing its own frame, and [`RecordStore::repair`]
//! removes them on request.
//!
//! Every operation takes the advisory lock and rereads the header. The
//! only state a handle keeps between calls is a hint naming the last frame
//! it appended, which is checked against the file before it is trusted.
//!
//! Compaction rewrites the file in place, under the exclusive lock, so
//! other handles on the same store stay valid. The compacted image is
//! published as a journal (`<store>.compact`) before the overwrite starts;
//! if the overwrite is interrupted, the next open or write replays it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::checksum::CHECKSUM_LEN;
use super::errors::{StoreError, StoreResult};
use super::iter::RecordIter;
use super::record::{
    decode_frame, encode_frame, FramePrefix, Record, FRAME_PREFIX_LEN, STORE_HEADER_LEN,
    VALID_FLAG_OFFSET,
};
use crate::lock::{FileLock, LockPolicy};
use crate::observability::{log_event_with_fields, Event};

/// Suffix of the published compaction journal
pub const JOURNAL_SUFFIX: &str = ".compact";

/// Suffix of a journal still being written
const STAGING_SUFFIX: &str = ".compact.tmp";

/// Result of a point read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Live record
    Live(Record),
    /// Frame exists but was logically deleted
    Tombstoned {
        /// Id of the deleted record
        id: u32,
    },
}

/// What [`RecordStore::repair`] found and did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Frames inside the acknowledged area
    pub frames_scanned: u64,
    /// Frames whose checksum failed (kept in place)
    pub corrupt_frames: u64,
    /// Offset the file was cut at, if anything was removed
    pub truncated_at: Option<u64>,
    /// Bytes removed from the tail
    pub bytes_removed: u64,
}

/// Counts from [`RecordStore::compact`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    /// Live frames copied
    pub live_copied: u64,
    /// Tombstoned frames dropped
    pub tombstones_dropped: u64,
    /// Corrupt frames dropped
    pub corrupt_dropped: u64,
    /// Size before compaction
    pub bytes_before: u64,
    /// Size after compaction
    pub bytes_after: u64,
}

/// Last frame this handle appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TailHint {
    offset: u64,
    id: u32,
}

/// Single-file record store
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    file: File,
    lock_policy: LockPolicy,
    tail_hint: Option<TailHint>,
}

impl RecordStore {
    /// Opens the store at `path`, creating it with a zeroed header if absent.
    ///
    /// A compaction journal left by an interrupted compaction is replayed
    /// before the header is checked.
    ///
    /// # Errors
    ///
    /// `CorruptHeader` if the file exists but is shorter than the header.
    pub fn open(path: &Path, lock_policy: LockPolicy) -> StoreResult<Self> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                StoreError::io(format!("Failed to open store file: {}", path.display()), e)
            })?;

        {
            let _lock = FileLock::exclusive(&file, &lock_policy)?;
            remove_if_present(&suffixed(path, STAGING_SUFFIX))?;
            let replayed = replay_journal(&file, path)?;
            let len = file_len(&file)?;
            if len == 0 && !existed && !replayed {
                write_header(&file, 0)?;
            } else if len < STORE_HEADER_LEN {
                return Err(StoreError::CorruptHeader { len });
            }
        }

        let store = Self {
            path: path.to_path_buf(),
            file,
            lock_policy,
            tail_hint: None,
        };
        let last_id = store.last_id()?;
        log_event_with_fields(
            Event::StoreOpen,
            &[
                ("last_id", &last_id.to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(store)
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current watermark, read from disk
    pub fn last_id(&self) -> StoreResult<u32> {
        let _lock = FileLock::shared(&self.file, &self.lock_policy)?;
        read_header(&self.file)
    }

    /// File size in bytes
    pub fn len(&self) -> StoreResult<u64> {
        let _lock = FileLock::shared(&self.file, &self.lock_policy)?;
        file_len(&self.file)
    }

    /// Returns whether the store holds no frames
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? <= STORE_HEADER_LEN)
    }

    /// Appends `payload` as a new live record.
    ///
    /// Returns the assigned id and the frame's byte offset. An unacknowledged
    /// tail left by an interrupted append is cut off first, so the new frame
    /// always directly follows the last acknowledged one.
    ///
    /// # Errors
    ///
    /// `Truncated` if an acknowledged frame runs past end-of-file; the store
    /// needs [`repair`](Self::repair) before it can take more records.
    pub fn append(&mut self, payload: &[u8]) -> StoreResult<(u32, u64)> {
        let _lock = lock_for_write(&self.file, &self.path, &self.lock_policy)?;
        let hint = append_locked(&self.file, self.tail_hint, payload)?;
        self.tail_hint = Some(hint);
        Ok((hint.id, hint.offset))
    }

    /// Reads the frame at `offset`, verifying its checksum.
    pub fn read(&self, offset: u64) -> StoreResult<ReadOutcome> {
        let _lock = FileLock::shared(&self.file, &self.lock_policy)?;
        let len = file_len(&self.file)?;
        let record = read_frame(&self.file, offset, len)?;

        if record.valid {
            Ok(ReadOutcome::Live(record))
        } else {
            Ok(ReadOutcome::Tombstoned { id: record.id })
        }
    }

    /// Lazy scan over every acknowledged frame, live and tombstoned.
    ///
    /// The watermark is captured now; frames appended later are not
    /// yielded.
    pub fn iter(&self) -> StoreResult<RecordIter<'_>> {
        let watermark = self.last_id()?;
        Ok(RecordIter::new(&self.file, self.lock_policy, watermark))
    }

    /// Tombstones the frame at `offset`. Idempotent.
    pub fn mark_deleted(&mut self, offset: u64) -> StoreResult<()> {
        let _lock = lock_for_write(&self.file, &self.path, &self.lock_policy)?;
        tombstone_locked(&self.file, offset)
    }

    /// Appends `payload` as a new record and tombstones the frame at
    /// `offset`, both under one exclusive lock.
    ///
    /// The new frame is acknowledged before the old one is tombstoned, so a
    /// crash in between leaves both records live rather than neither.
    pub fn update(&mut self, offset: u64, payload: &[u8]) -> StoreResult<(u32, u64)> {
        let _lock = lock_for_write(&self.file, &self.path, &self.lock_policy)?;
        let len = file_len(&self.file)?;
        check_acknowledged(&self.file, offset, len)?;

        let hint = append_locked(&self.file, self.tail_hint, payload)?;
        self.tail_hint = Some(hint);
        tombstone_locked(&self.file, offset)?;
        Ok((hint.id, hint.offset))
    }

    /// Cuts the file at the first frame that is truncated or lies beyond
    /// the watermark. Checksum failures inside the acknowledged area are
    /// counted but kept, since their successors are still readable.
    pub fn repair(&mut self) -> StoreResult<RepairReport> {
        let _lock = lock_for_write(&self.file, &self.path, &self.lock_policy)?;
        let watermark = read_header(&self.file)?;
        let len = file_len(&self.file)?;

        let mut report = RepairReport::default();
        let end = walk_acknowledged(&self.file, STORE_HEADER_LEN, watermark, len, |pos, _| {
            report.frames_scanned += 1;
            match read_frame(&self.file, pos, len) {
                Err(StoreError::CorruptRecord { .. }) => report.corrupt_frames += 1,
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            Ok(())
        })?;

        if end < len {
            cut_tail(&self.file, end, len, "repair")?;
            report.truncated_at = Some(end);
            report.bytes_removed = len - end;
        }
        Ok(report)
    }

    /// Rewrites the store in place so it holds only its live, intact
    /// frames. Ids and the watermark are preserved; offsets are not.
    ///
    /// The exclusive lock is held from the first read to the final fsync,
    /// so no append or tombstone from another handle can land in between
    /// and be lost.
    pub fn compact(&mut self) -> StoreResult<CompactionStats> {
        let _lock = lock_for_write(&self.file, &self.path, &self.lock_policy)?;
        let watermark = read_header(&self.file)?;
        let len = file_len(&self.file)?;

        let mut stats = CompactionStats {
            bytes_before: len,
            ..CompactionStats::default()
        };
        let mut image = Vec::with_capacity(STORE_HEADER_LEN as usize);
        image.extend_from_slice(&watermark.to_le_bytes());

        walk_acknowledged(&self.file, STORE_HEADER_LEN, watermark, len, |pos, _| {
            match read_frame(&self.file, pos, len) {
                Ok(record) if record.valid => {
                    image.extend_from_slice(&encode_frame(record.id, &record.payload)?);
                    stats.live_copied += 1;
                }
                Ok(_) => stats.tombstones_dropped += 1,
                Err(StoreError::CorruptRecord { .. }) => stats.corrupt_dropped += 1,
                Err(e) => return Err(e),
            }
            Ok(())
        })?;

        let staging = suffixed(&self.path, STAGING_SUFFIX);
        let journal = suffixed(&self.path, JOURNAL_SUFFIX);
        write_new_file(&staging, &image)?;
        fs::rename(&staging, &journal).map_err(|e| {
            StoreError::io(format!("Failed to publish journal {}", journal.display()), e)
        })?;
        apply_image(&self.file, &image)?;
        remove_if_present(&journal)?;

        self.tail_hint = None;
        stats.bytes_after = image.len() as u64;
        Ok(stats)
    }
}

/// Takes the exclusive lock and finishes any interrupted compaction.
fn lock_for_write<'a>(
    file: &'a File,
    path: &Path,
    policy: &LockPolicy,
) -> StoreResult<FileLock<'a>> {
    let lock = FileLock::exclusive(file, policy)?;
    replay_journal(file, path)?;
    Ok(lock)
}

/// Writes a new frame directly after the last acknowledged one and
/// advances the watermark. Caller holds the exclusive lock.
fn append_locked(file: &File, hint: Option<TailHint>, payload: &[u8]) -> StoreResult<TailHint> {
    let last_id = read_header(file)?;
    let id = last_id.checked_add(1).ok_or(StoreError::IdExhausted)?;
    let frame = encode_frame(id, payload)?;

    let len = file_len(file)?;
    let offset = acknowledged_end(file, last_id, len, hint)?;
    if offset < len {
        // An acknowledged frame that overruns the file is damage, not a
        // leftover; only repair may drop it.
        if let Ok(prefix) = read_prefix(file, offset, len) {
            if prefix.id <= last_id {
                return Err(StoreError::Truncated {
                    offset,
                    needed: prefix.frame_len(),
                    available: len - offset,
                });
            }
        }
        cut_tail(file, offset, len, "append")?;
    }

    write_at(file, offset, &frame, "Failed to write frame")?;
    sync(file, "fsync failed after frame write")?;
    write_header(file, id)?;

    log_event_with_fields(
        Event::StoreAppend,
        &[("id", &id.to_string()), ("offset", &offset.to_string())],
    );
    Ok(TailHint { offset, id })
}

/// Clears the valid flag of the frame at `offset`. Caller holds the
/// exclusive lock.
fn tombstone_locked(file: &File, offset: u64) -> StoreResult<()> {
    let len = file_len(file)?;
    let prefix = check_acknowledged(file, offset, len)?;

    write_at(file, offset + VALID_FLAG_OFFSET, &[0], "Failed to write tombstone")?;
    sync(file, "fsync failed after tombstone write")?;

    log_event_with_fields(
        Event::StoreDelete,
        &[("id", &prefix.id.to_string()), ("offset", &offset.to_string())],
    );
    Ok(())
}

/// Reads the prefix at `offset`, rejecting frames beyond the watermark.
fn check_acknowledged(file: &File, offset: u64, len: u64) -> StoreResult<FramePrefix> {
    let prefix = read_prefix(file, offset, len)?;
    if prefix.id > read_header(file)? {
        return Err(StoreError::InvalidOffset(offset));
    }
    Ok(prefix)
}

/// Offset just past the last acknowledged frame.
///
/// Resumes from `hint` when the hinted frame is still where it was left;
/// otherwise walks from the first frame.
fn acknowledged_end(
    file: &File,
    watermark: u32,
    len: u64,
    hint: Option<TailHint>,
) -> StoreResult<u64> {
    let start = match hint {
        Some(hint) if hint.id <= watermark => match read_frame(file, hint.offset, len) {
            Ok(record) if record.id == hint.id => hint.offset + record.frame_len(),
            _ => STORE_HEADER_LEN,
        },
        _ => STORE_HEADER_LEN,
    };
    walk_acknowledged(file, start, watermark, len, |_, _| Ok(()))
}

/// Walks the frames from `from` while they fit in the file and carry an id
/// at or below `watermark`, calling `visit` with each frame's offset and
/// prefix. Returns the offset where the walk stopped.
fn walk_acknowledged<F>(
    file: &File,
    from: u64,
    watermark: u32,
    len: u64,
    mut visit: F,
) -> StoreResult<u64>
where
    F: FnMut(u64, &FramePrefix) -> StoreResult<()>,
{
    let mut pos = from;
    while pos < len {
        let prefix = match read_prefix(file, pos, len) {
            Ok(prefix) => prefix,
            Err(StoreError::Truncated { .. }) => break,
            Err(e) => return Err(e),
        };
        if prefix.id > watermark || pos + prefix.frame_len() > len {
            break;
        }
        visit(pos, &prefix)?;
        pos += prefix.frame_len();
    }
    Ok(pos)
}

/// Truncates the file to `at` bytes.
fn cut_tail(file: &File, at: u64, len: u64, cause: &str) -> StoreResult<()> {
    file.set_len(at)
        .map_err(|e| StoreError::io(format!("Failed to truncate store at {}", at), e))?;
    sync(file, "fsync failed after truncation")?;

    log_event_with_fields(
        Event::StoreRepair,
        &[
            ("bytes_removed", &(len - at).to_string()),
            ("cause", cause),
            ("truncated_at", &at.to_string()),
        ],
    );
    Ok(())
}

/// Copies a published compaction journal over the store and removes it.
/// Returns whether a journal was found. Caller holds the exclusive lock.
fn replay_journal(file: &File, path: &Path) -> StoreResult<bool> {
    let journal = suffixed(path, JOURNAL_SUFFIX);
    let image = match fs::read(&journal) {
        Ok(image) => image,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(StoreError::io(
                format!("Failed to read journal {}", journal.display()),
                e,
            ))
        }
    };
    if (image.len() as u64) < STORE_HEADER_LEN {
        return Err(StoreError::CorruptHeader {
            len: image.len() as u64,
        });
    }

    apply_image(file, &image)?;
    remove_if_present(&journal)?;
    log_event_with_fields(
        Event::CompactionReplayed,
        &[
            ("bytes", &image.len().to_string()),
            ("journal", &journal.display().to_string()),
        ],
    );
    Ok(true)
}

/// Overwrites the whole store with `image`.
fn apply_image(file: &File, image: &[u8]) -> StoreResult<()> {
    write_at(file, 0, image, "Failed to write compacted store")?;
    file.set_len(image.len() as u64)
        .map_err(|e| StoreError::io("Failed to resize compacted store", e))?;
    sync(file, "fsync failed after compaction")
}

fn write_new_file(path: &Path, data: &[u8]) -> StoreResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| StoreError::io(format!("Failed to create {}", path.display()), e))?;
    write_at(&file, 0, data, "Failed to write journal")?;
    sync(&file, "fsync failed after journal write")
}

fn remove_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(format!("Failed to remove {}", path.display()), e)),
    }
}

/// `path` with `suffix` appended to its file name
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub(super) fn file_len(file: &File) -> StoreResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| StoreError::io("Failed to read store metadata", e))
}

pub(super) fn read_header(file: &File) -> StoreResult<u32> {
    let len = file_len(file)?;
    if len < STORE_HEADER_LEN {
        return Err(StoreError::CorruptHeader { len });
    }
    let mut buf = [0u8; 4];
    read_at(file, 0, &mut buf, "Failed to read store header")?;
    Ok(u32::from_le_bytes(buf))
}

fn write_header(file: &File, last_id: u32) -> StoreResult<()> {
    write_at(file, 0, &last_id.to_le_bytes(), "Failed to write store header")?;
    sync(file, "fsync failed after header write")
}

/// Reads and validates the prefix of the frame at `offset`.
pub(super) fn read_prefix(file: &File, offset: u64, len: u64) -> StoreResult<FramePrefix> {
    if offset < STORE_HEADER_LEN || offset >= len {
        return Err(StoreError::InvalidOffset(offset));
    }
    if offset + FRAME_PREFIX_LEN as u64 > len {
        return Err(StoreError::Truncated {
            offset,
            needed: FRAME_PREFIX_LEN as u64,
            available: len - offset,
        });
    }
    let mut buf = [0u8; FRAME_PREFIX_LEN];
    read_at(file, offset, &mut buf, "Failed to read frame prefix")?;
    Ok(FramePrefix::parse(&buf))
}

/// Reads the whole frame at `offset` and verifies its checksum.
pub(super) fn read_frame(file: &File, offset: u64, len: u64) -> StoreResult<Record> {
    let prefix = read_prefix(file, offset, len)?;
    let frame_len = prefix.frame_len();
    if offset + frame_len > len {
        return Err(StoreError::Truncated {
            offset,
            needed: frame_len,
            available: len - offset,
        });
    }
    if (prefix.payload_len as usize) < CHECKSUM_LEN {
        return Err(StoreError::CorruptRecord {
            offset,
            id: prefix.id,
        });
    }

    let mut body = vec![0u8; prefix.payload_len as usize];
    read_at(
        file,
        offset + FRAME_PREFIX_LEN as u64,
        &mut body,
        "Failed to read frame body",
    )?;
    decode_frame(&prefix, offset, &body)
}

fn read_at(mut file: &File, offset: u64, buf: &mut [u8], context: &str) -> StoreResult<()> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buf))
        .map_err(|e| StoreError::io(format!("{} at offset {}", context, offset), e))
}

fn write_at(mut file: &File, offset: u64, data: &[u8], context: &str) -> StoreResult<()> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(data))
        .map_err(|e| StoreError::io(format!("{} at offset {}", context, offset), e))
}

fn sync(file: &File, context: &str) -> StoreResult<()> {
    file.sync_all().map_err(|e| StoreError::io(context, e))
}
