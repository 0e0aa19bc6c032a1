//! Database facade
//!
//! Couples one [`RecordStore`] with one [`HashIndex`] keyed by record id:
//!
//! ```text
//! <data_dir>/records.db        record store
//! <data_dir>/records.idx       index directory
//! <data_dir>/records.idx.bkt   index buckets
//! ```
//!
//! The store is the source of truth. Every write reaches the store first
//! and the index second, so a crash in between leaves at most an
//! unindexed record, which [`Database::rebuild_index`] recovers.

mod errors;
mod validate;

pub use errors::{
    DbError, DbResult, EXIT_CORRUPT, EXIT_LOCK_CONTENTION, EXIT_NOT_FOUND, EXIT_OK, EXIT_USAGE,
};
pub use validate::{AcceptAll, FieldCountValidator, PayloadValidator};

use std::fs;
use std::io::BufRead;
use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::index::{HashIndex, IndexStats};
use crate::observability::{log_event_with_fields, Event};
use crate::storage::{
    CompactionStats, ReadOutcome, Record, RecordIter, RecordStore, RepairReport, StoreError,
};

/// Store file name inside the data directory
pub const STORE_FILE: &str = "records.db";
/// Index directory file name inside the data directory
pub const INDEX_FILE: &str = "records.idx";

/// Result of a lookup by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live record
    Found(Record),
    /// The id existed but was deleted
    Tombstoned(u32),
    /// The id was never indexed
    NotFound,
}

/// Counts from [`Database::rebuild_index`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Live records indexed
    pub live: u64,
    /// Tombstoned records indexed
    pub tombstoned: u64,
    /// Corrupt frames skipped
    pub corrupt_skipped: u64,
    /// Offset of a truncated tail frame, if the scan hit one
    pub truncated_at: Option<u64>,
}

/// Result of [`Database::repair`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DbRepairReport {
    /// Store tail repair
    pub store: RepairReport,
    /// Index rebuild that followed
    pub index: RebuildReport,
}

/// Counts from [`Database::import_rows`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Data rows read, header and blank lines excluded
    pub processed: u64,
    /// Rows stored
    pub imported: u64,
    /// Rows the validator rejected
    pub invalid: u64,
    /// Id of the first stored row
    pub first_id: Option<u32>,
    /// Id of the last stored row
    pub last_id: Option<u32>,
}

/// Result of [`Database::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Store watermark
    pub last_id: u32,
    /// Live frames
    pub live: u64,
    /// Tombstoned frames
    pub tombstoned: u64,
    /// Frames failing their checksum
    pub corrupt: u64,
    /// Offset of a truncated tail frame, if any
    pub truncated_at: Option<u64>,
    /// Bytes after the last acknowledged frame
    pub unacknowledged_bytes: u64,
    /// Readable frames the index does not map to their offset
    pub unindexed: u64,
    /// Index structure summary
    pub index: IndexStats,
}

impl VerifyReport {
    /// Returns whether nothing needs repair
    pub fn is_clean(&self) -> bool {
        self.corrupt == 0
            && self.truncated_at.is_none()
            && self.unacknowledged_bytes == 0
            && self.unindexed == 0
    }
}

/// Record store plus id index
#[derive(Debug)]
pub struct Database {
    config: Config,
    store: RecordStore,
    index: HashIndex,
}

impl Database {
    /// Opens (creating if needed) the database under `config.data_dir`.
    pub fn open(config: Config) -> DbResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir).map_err(|e| {
            DbError::io(
                format!("Failed to create data directory: {}", config.data_dir.display()),
                e,
            )
        })?;

        let store = RecordStore::open(&config.data_dir.join(STORE_FILE), config.lock_policy())?;
        let index = HashIndex::open(&config.data_dir.join(INDEX_FILE), config.index_config())?;

        Ok(Self {
            config,
            store,
            index,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Underlying record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Underlying index
    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    /// Appends `payload` and indexes it. Returns `(id, offset)`.
    pub fn insert(&mut self, payload: &[u8]) -> DbResult<(u32, u64)> {
        let (id, offset) = self.store.append(payload)?;
        self.index.put(id, offset)?;
        Ok((id, offset))
    }

    /// Like [`insert`](Self::insert), after `validator` accepts the payload.
    pub fn insert_validated(
        &mut self,
        payload: &[u8],
        validator: &dyn PayloadValidator,
    ) -> DbResult<(u32, u64)> {
        if let Err(reason) = validator.validate(payload) {
            log_event_with_fields(
                Event::PayloadRejected,
                &[("len", &payload.len().to_string()), ("reason", &reason)],
            );
            return Err(DbError::InvalidPayload(reason));
        }
        self.insert(payload)
    }

    /// Stores every data row of a delimited text file, one record per row.
    ///
    /// The first non-blank line is the header and is skipped, as are blank
    /// lines. Rows are stored without their line ending. A row the
    /// validator rejects is counted and logged, and the import carries on;
    /// store and index failures abort it, leaving earlier rows in place.
    pub fn import_rows<R: BufRead>(
        &mut self,
        mut reader: R,
        validator: &dyn PayloadValidator,
    ) -> DbResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut header_seen = false;
        let mut line_no = 0u64;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| DbError::io(format!("Failed to read row {}", line_no + 1), e))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let row = trim_line_ending(&line);
            if row.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if !header_seen {
                header_seen = true;
                continue;
            }

            report.processed += 1;
            if let Err(reason) = validator.validate(row) {
                report.invalid += 1;
                log_event_with_fields(
                    Event::PayloadRejected,
                    &[("line", &line_no.to_string()), ("reason", &reason)],
                );
                continue;
            }

            let (id, _) = self.insert(row)?;
            report.imported += 1;
            if report.first_id.is_none() {
                report.first_id = Some(id);
            }
            report.last_id = Some(id);
        }

        log_event_with_fields(
            Event::ImportComplete,
            &[
                ("imported", &report.imported.to_string()),
                ("invalid", &report.invalid.to_string()),
                ("processed", &report.processed.to_string()),
            ],
        );
        Ok(report)
    }

    /// Looks up `id`.
    pub fn get(&self, id: u32) -> DbResult<Lookup> {
        let Some(offset) = self.index.get(id)? else {
            return Ok(Lookup::NotFound);
        };
        match self.store.read(offset)? {
            ReadOutcome::Live(record) if record.id == id => Ok(Lookup::Found(record)),
            ReadOutcome::Tombstoned { id: found } if found == id => Ok(Lookup::Tombstoned(id)),
            ReadOutcome::Live(Record { id: found, .. }) | ReadOutcome::Tombstoned { id: found } => {
                Err(DbError::IndexMismatch { id, offset, found })
            }
        }
    }

    /// Tombstones `id`. Returns false if it was absent or already deleted.
    pub fn delete(&mut self, id: u32) -> DbResult<bool> {
        match self.get(id)? {
            Lookup::Found(record) => {
                self.store.mark_deleted(record.offset)?;
                Ok(true)
            }
            Lookup::Tombstoned(_) | Lookup::NotFound => Ok(false),
        }
    }

    /// Replaces `id` with a new record holding `payload`; returns the new id.
    pub fn update(&mut self, id: u32, payload: &[u8]) -> DbResult<u32> {
        let offset = match self.get(id)? {
            Lookup::Found(record) => record.offset,
            Lookup::Tombstoned(_) => return Err(DbError::Tombstoned(id)),
            Lookup::NotFound => return Err(DbError::NotFound(id)),
        };
        let (new_id, new_offset) = self.store.update(offset, payload)?;
        self.index.put(new_id, new_offset)?;
        Ok(new_id)
    }

    /// Scans every frame in the store, live and tombstoned.
    pub fn scan(&self) -> DbResult<RecordIter<'_>> {
        Ok(self.store.iter()?)
    }

    /// Clears the index and refills it from a full store scan.
    ///
    /// Tombstoned records are indexed too so lookups report them as
    /// deleted rather than missing.
    pub fn rebuild_index(&mut self) -> DbResult<RebuildReport> {
        log_event_with_fields(
            Event::IndexRebuildBegin,
            &[("store", &self.store.path().display().to_string())],
        );
        self.index.clear()?;

        let mut report = RebuildReport::default();
        let mut iter = self.store.iter()?;
        for item in iter.by_ref() {
            match item {
                Ok(record) => {
                    self.index.put(record.id, record.offset)?;
                    if record.valid {
                        report.live += 1;
                    } else {
                        report.tombstoned += 1;
                    }
                }
                Err(StoreError::Truncated { offset, .. }) => report.truncated_at = Some(offset),
                Err(e) => return Err(e.into()),
            }
        }
        report.corrupt_skipped = iter.corrupt_skipped();

        log_event_with_fields(
            Event::IndexRebuildComplete,
            &[
                ("corrupt_skipped", &report.corrupt_skipped.to_string()),
                ("live", &report.live.to_string()),
                ("tombstoned", &report.tombstoned.to_string()),
            ],
        );
        Ok(report)
    }

    /// Truncates any unacknowledged or torn store tail, then reindexes.
    pub fn repair(&mut self) -> DbResult<DbRepairReport> {
        let store = self.store.repair()?;
        let index = self.rebuild_index()?;
        Ok(DbRepairReport { store, index })
    }

    /// Rewrites the store without tombstoned or corrupt frames, keeping
    /// ids and the watermark, then reindexes.
    ///
    /// The store is compacted in place, so other handles on it stay valid.
    /// Their index lookups may miss until the rebuild below completes.
    pub fn compact(&mut self) -> DbResult<CompactionStats> {
        log_event_with_fields(
            Event::CompactionBegin,
            &[("store", &self.store.path().display().to_string())],
        );

        let stats = self.store.compact()?;
        self.rebuild_index()?;

        log_event_with_fields(
            Event::CompactionComplete,
            &[
                ("bytes_after", &stats.bytes_after.to_string()),
                ("bytes_before", &stats.bytes_before.to_string()),
                ("live_copied", &stats.live_copied.to_string()),
            ],
        );
        Ok(stats)
    }

    /// Scans the store and checks the index against it.
    pub fn verify(&self) -> DbResult<VerifyReport> {
        let mut report = VerifyReport {
            last_id: self.store.last_id()?,
            index: self.index.verify()?,
            ..VerifyReport::default()
        };

        let mut iter = self.store.iter()?;
        for item in iter.by_ref() {
            match item {
                Ok(record) => {
                    if record.valid {
                        report.live += 1;
                    } else {
                        report.tombstoned += 1;
                    }
                    if self.index.get(record.id)? != Some(record.offset) {
                        report.unindexed += 1;
                    }
                }
                Err(StoreError::Truncated { offset, .. }) => report.truncated_at = Some(offset),
                Err(e) => return Err(e.into()),
            }
        }
        report.corrupt = iter.corrupt_skipped();
        if report.truncated_at.is_none() {
            report.unacknowledged_bytes = self.store.len()?.saturating_sub(iter.position());
        }

        log_event_with_fields(
            Event::VerifyComplete,
            &[
                ("clean", &report.is_clean().to_string()),
                ("corrupt", &report.corrupt.to_string()),
                ("unindexed", &report.unindexed.to_string()),
            ],
        );
        Ok(report)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
