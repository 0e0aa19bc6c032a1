//! Observable events for accdb
//!
//! Events are explicit and typed; each maps to one stable log name and a
//! default severity.

use std::fmt;

use super::logger::Severity;

/// Observable events in accdb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Record store
    /// Store file opened (or created)
    StoreOpen,
    /// Record appended
    StoreAppend,
    /// Record tombstoned
    StoreDelete,
    /// Checksum mismatch skipped during a scan
    StoreCorruptRecord,
    /// Frame beyond the watermark (unacknowledged write) seen during a scan
    StoreUnacknowledgedFrame,
    /// Store tail truncated by repair
    StoreRepair,

    // Hash index
    /// Index files opened (or created)
    IndexOpen,
    /// Bucket split
    IndexSplit,
    /// Directory doubled
    IndexDirectoryDoubled,
    /// Index rebuild from a store scan begins
    IndexRebuildBegin,
    /// Index rebuild complete
    IndexRebuildComplete,

    // Database maintenance
    /// Payload rejected by the validator
    PayloadRejected,
    /// Compaction begins
    CompactionBegin,
    /// Compaction complete
    CompactionComplete,
    /// Journal of an interrupted compaction copied over the store
    CompactionReplayed,
    /// CSV import complete
    ImportComplete,
    /// Verification complete
    VerifyComplete,

    // Locking
    /// Advisory lock busy, retrying
    LockContention,

    // Codecs
    /// File compressed
    CodecEncode,
    /// File decompressed
    CodecDecode,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::StoreOpen => "STORE_OPEN",
            Event::StoreAppend => "STORE_APPEND",
            Event::StoreDelete => "STORE_DELETE",
            Event::StoreCorruptRecord => "STORE_CORRUPT_RECORD",
            Event::StoreUnacknowledgedFrame => "STORE_UNACKNOWLEDGED_FRAME",
            Event::StoreRepair => "STORE_REPAIR",

            Event::IndexOpen => "INDEX_OPEN",
            Event::IndexSplit => "INDEX_SPLIT",
            Event::IndexDirectoryDoubled => "INDEX_DIRECTORY_DOUBLED",
            Event::IndexRebuildBegin => "INDEX_REBUILD_BEGIN",
            Event::IndexRebuildComplete => "INDEX_REBUILD_COMPLETE",

            Event::PayloadRejected => "PAYLOAD_REJECTED",
            Event::CompactionBegin => "COMPACTION_BEGIN",
            Event::CompactionComplete => "COMPACTION_COMPLETE",
            Event::CompactionReplayed => "COMPACTION_REPLAYED",
            Event::ImportComplete => "IMPORT_COMPLETE",
            Event::VerifyComplete => "VERIFY_COMPLETE",

            Event::LockContention => "LOCK_CONTENTION",

            Event::CodecEncode => "CODEC_ENCODE",
            Event::CodecDecode => "CODEC_DECODE",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StoreCorruptRecord
            | Event::StoreUnacknowledgedFrame
            | Event::StoreRepair
            | Event::CompactionReplayed
            | Event::PayloadRejected
            | Event::LockContention => Severity::Warn,
            Event::StoreAppend | Event::StoreDelete | Event::IndexSplit => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
