//! Record Store Integrity Tests
//!
//! Covers:
//! - Exact on-disk framing of the first record
//! - Tombstones are visible to iteration in append order
//! - A corrupted payload fails its read but never stops a scan
//! - Ids grow monotonically and survive reopen
//! - Torn tails are reported, then removed by repair
//! - Appends after an interrupted append never reuse or lose an id
//! - Compaction keeps every handle on the store valid
//! - A failed update leaves the old record live

use accdb::lock::LockPolicy;
use accdb::storage::{compute_checksum, ReadOutcome, RecordStore, StoreError, STORE_HEADER_LEN};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn store_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("records.db")
}

fn open_store(temp_dir: &TempDir) -> RecordStore {
    RecordStore::open(&store_path(temp_dir), LockPolicy::default()).expect("Failed to open store")
}

fn collect_flags(store: &RecordStore) -> Vec<(u32, bool)> {
    store
        .iter()
        .unwrap()
        .map(|r| r.unwrap())
        .map(|r| (r.id, r.valid))
        .collect()
}

fn collect_ids(store: &RecordStore) -> Vec<u32> {
    store.iter().unwrap().map(|r| r.unwrap().id).collect()
}

/// A live frame as an interrupted append would have left it
fn raw_frame(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = id.to_le_bytes().to_vec();
    frame.push(1);
    frame.extend_from_slice(&(32 + payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compute_checksum(payload));
    frame.extend_from_slice(payload);
    frame
}

fn append_raw(temp_dir: &TempDir, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(store_path(temp_dir))
        .unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_first_append_layout() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    assert_eq!(store.append(b"hello").unwrap(), (1, STORE_HEADER_LEN));

    let bytes = fs::read(store_path(&temp_dir)).unwrap();
    assert_eq!(bytes.len(), 4 + 4 + 1 + 4 + 32 + 5);
    assert_eq!(&bytes[0..4], &[0x01, 0x00, 0x00, 0x00]);
    // Frame: id, valid flag, length of checksum plus payload
    assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
    assert_eq!(bytes[8], 1);
    assert_eq!(&bytes[9..13], &37u32.to_le_bytes());
    assert_eq!(&bytes[45..], b"hello");
}

#[test]
fn test_empty_payload_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    let (id, offset) = store.append(b"").unwrap();
    match store.read(offset).unwrap() {
        ReadOutcome::Live(record) => {
            assert_eq!(record.id, id);
            assert!(record.payload.is_empty());
        }
        other => panic!("expected live record, got {:?}", other),
    }
}

// =============================================================================
// Tombstones
// =============================================================================

#[test]
fn test_iter_reports_tombstone_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    let mut offsets = Vec::new();
    for payload in [&b"first"[..], b"second", b"third"] {
        offsets.push(store.append(payload).unwrap().1);
    }
    store.mark_deleted(offsets[1]).unwrap();

    assert_eq!(collect_flags(&store), vec![(1, true), (2, false), (3, true)]);
    assert_eq!(store.read(offsets[1]).unwrap(), ReadOutcome::Tombstoned { id: 2 });
}

#[test]
fn test_delete_does_not_change_length() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    let (_, offset) = store.append(b"keep the bytes").unwrap();
    let before = store.len().unwrap();

    store.mark_deleted(offset).unwrap();
    store.mark_deleted(offset).unwrap();

    assert_eq!(store.len().unwrap(), before);
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn test_corrupt_payload_detected_and_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    let (_, first) = store.append(b"alpha").unwrap();
    let (_, second) = store.append(b"bravo").unwrap();
    let (_, third) = store.append(b"charlie").unwrap();

    // Flip the last payload byte of the second frame
    {
        let path = store_path(&temp_dir);
        let mut bytes = fs::read(&path).unwrap();
        let last = (third - 1) as usize;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
    }

    let err = store.read(second).unwrap_err();
    assert!(matches!(err, StoreError::CorruptRecord { id: 2, .. }));
    assert!(err.is_corruption());
    assert!(matches!(store.read(first).unwrap(), ReadOutcome::Live(_)));

    let mut iter = store.iter().unwrap();
    let ids: Vec<u32> = iter.by_ref().map(|r| r.unwrap().id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(iter.corrupt_skipped(), 1);
}

#[test]
fn test_flipped_valid_byte_is_not_a_checksum_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    let (_, offset) = store.append(b"flag is outside the digest").unwrap();

    let path = store_path(&temp_dir);
    let mut bytes = fs::read(&path).unwrap();
    bytes[offset as usize + 4] = 0;
    fs::write(&path, bytes).unwrap();

    assert_eq!(store.read(offset).unwrap(), ReadOutcome::Tombstoned { id: 1 });
}

#[test]
fn test_truncated_tail_then_repair() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    store.append(b"whole").unwrap();
    store.append(b"will be torn").unwrap();
    let full_len = store.len().unwrap();

    {
        let file = OpenOptions::new()
            .write(true)
            .open(store_path(&temp_dir))
            .unwrap();
        file.set_len(full_len - 3).unwrap();
    }

    let results: Vec<_> = store.iter().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(StoreError::Truncated { .. })));

    let report = store.repair().unwrap();
    assert_eq!(report.truncated_at, Some(50));
    assert_eq!(store.len().unwrap(), 50);
    assert_eq!(collect_flags(&store), vec![(1, true)]);

    // The acknowledged id of the lost frame is never handed out again
    assert_eq!(store.last_id().unwrap(), 2);
    assert_eq!(store.append(b"next").unwrap(), (3, 50));
}

#[test]
fn test_bad_header_rejected() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(store_path(&temp_dir), [0x01, 0x00]).unwrap();

    let err = RecordStore::open(&store_path(&temp_dir), LockPolicy::default()).unwrap_err();
    assert!(matches!(err, StoreError::CorruptHeader { .. }));
}

// =============================================================================
// Interrupted Appends
// =============================================================================

#[test]
fn test_append_replaces_unacknowledged_frame() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    assert_eq!(store.append(b"whole").unwrap(), (1, 4));

    // Frame 2 reached the disk but the header never moved past 1
    append_raw(&temp_dir, &raw_frame(2, b"never acknowledged"));

    assert_eq!(store.append(b"replacement").unwrap(), (2, 50));
    assert_eq!(collect_flags(&store), vec![(1, true), (2, true)]);
    match store.read(50).unwrap() {
        ReadOutcome::Live(record) => assert_eq!(record.payload, b"replacement"),
        other => panic!("expected live record, got {:?}", other),
    }

    let reopened = open_store(&temp_dir);
    assert_eq!(collect_ids(&reopened), vec![1, 2]);
    // The orphan is gone; the replacement directly follows frame 1
    assert_eq!(reopened.len().unwrap(), 50 + 9 + 32 + 11);
}

#[test]
fn test_append_after_torn_prefix_stays_reachable() {
    let temp_dir = TempDir::new().unwrap();
    store_with_torn_prefix(&temp_dir);

    // A fresh handle holds no hint and must find the end by scanning
    let mut store = open_store(&temp_dir);
    assert_eq!(store.append(b"after the crash").unwrap(), (2, 50));

    let results: Vec<_> = store.iter().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_ok()));

    let report = store.repair().unwrap();
    assert_eq!(report.bytes_removed, 0);
    assert_eq!(report.frames_scanned, 2);
}

fn store_with_torn_prefix(temp_dir: &TempDir) {
    let mut store = open_store(temp_dir);
    store.append(b"whole").unwrap();
    // Id 2, valid, claims 100 body bytes; only 3 of them made it
    append_raw(temp_dir, &[2, 0, 0, 0, 1, 100, 0, 0, 0, 0xAA, 0xAA, 0xAA]);
}

// =============================================================================
// Compaction And Updates
// =============================================================================

#[test]
fn test_compaction_keeps_peer_handles_valid() {
    let temp_dir = TempDir::new().unwrap();
    let mut compactor = open_store(&temp_dir);
    let mut peer = open_store(&temp_dir);

    let mut offsets = Vec::new();
    for i in 1..=10u32 {
        offsets.push(compactor.append(format!("row {}", i).as_bytes()).unwrap().1);
    }
    for index in [1usize, 3, 5] {
        compactor.mark_deleted(offsets[index]).unwrap();
    }

    let stats = compactor.compact().unwrap();
    assert_eq!(stats.live_copied, 7);

    // The peer writes into the compacted file, not a replaced one
    let (id, offset) = peer.append(b"from the peer").unwrap();
    assert_eq!((id, offset), (11, stats.bytes_after));
    assert_eq!(collect_ids(&compactor), vec![1, 3, 5, 7, 8, 9, 10, 11]);
    assert_eq!(collect_ids(&open_store(&temp_dir)), vec![1, 3, 5, 7, 8, 9, 10, 11]);
}

#[test]
fn test_failed_update_keeps_old_record_live() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    let (_, offset) = store.append(b"original").unwrap();

    // Exhaust the id space so the replacement cannot be appended
    {
        let path = store_path(&temp_dir);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, bytes).unwrap();
    }

    assert!(matches!(
        store.update(offset, b"replacement"),
        Err(StoreError::IdExhausted)
    ));
    assert!(matches!(store.read(offset).unwrap(), ReadOutcome::Live(_)));
}

// =============================================================================
// Ids
// =============================================================================

#[test]
fn test_ids_monotonic_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&temp_dir);
        for i in 0..5u8 {
            let (id, _) = store.append(&[i]).unwrap();
            assert_eq!(id, i as u32 + 1);
        }
    }

    let mut store = open_store(&temp_dir);
    assert_eq!(store.last_id().unwrap(), 5);
    let (id, _) = store.append(b"after reopen").unwrap();
    assert_eq!(id, 6);
}

#[test]
fn test_two_handles_share_the_header() {
    let temp_dir = TempDir::new().unwrap();
    let mut a = open_store(&temp_dir);
    let mut b = open_store(&temp_dir);

    assert_eq!(a.append(b"from a").unwrap().0, 1);
    assert_eq!(b.append(b"from b").unwrap().0, 2);
    assert_eq!(a.append(b"from a again").unwrap().0, 3);

    assert_eq!(
        collect_flags(&b),
        vec![(1, true), (2, true), (3, true)]
    );
}
