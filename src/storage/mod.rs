//! Record storage subsystem for accdb
//!
//! A single append-only file of checksummed, variable-length frames behind
//! a 4-byte `last_id` watermark.
//!
//! # Design Principles
//!
//! - Append-only; the in-place writes are the one-byte tombstone flag and
//!   a compaction, which is journaled first
//! - SHA-256 verified on every read
//! - Frame fsynced before the watermark advances
//! - Ids start at 1, strictly monotonic, never reused

mod checksum;
mod errors;
mod iter;
mod record;
mod store;

pub use checksum::{compute_checksum, verify_checksum, CHECKSUM_LEN};
pub use errors::{StoreError, StoreResult};
pub use iter::RecordIter;
pub use record::{Record, FRAME_PREFIX_LEN, STORE_HEADER_LEN};
pub use store::{CompactionStats, ReadOutcome, RecordStore, RepairReport, JOURNAL_SUFFIX};
