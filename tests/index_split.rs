//! Extendible Hash Index Tests
//!
//! Covers:
//! - Bucket splits and directory doubling under small capacities
//! - Overwrites never split
//! - Randomized workloads keep every key retrievable and the
//!   directory structurally sound
//! - Lookups from a second handle observe committed puts

use accdb::index::{HashIndex, IndexConfig, IndexError};
use accdb::lock::LockPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn index_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("records.idx")
}

fn open_index(temp_dir: &TempDir, capacity: u32) -> HashIndex {
    HashIndex::open(&index_path(temp_dir), IndexConfig::with_capacity(capacity))
        .expect("Failed to open index")
}

// =============================================================================
// Splits
// =============================================================================

#[test]
fn test_split_on_third_odd_key() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_index(&temp_dir, 2);

    index.put(1, 100).unwrap();
    index.put(3, 300).unwrap();
    assert_eq!(index.global_depth().unwrap(), 1);

    index.put(5, 500).unwrap();
    assert!(index.global_depth().unwrap() >= 2, "inserting 5 must split");

    index.put(7, 700).unwrap();
    assert!(index.global_depth().unwrap() >= 2);
    for (key, value) in [(1, 100), (3, 300), (5, 500), (7, 700)] {
        assert_eq!(index.get(key).unwrap(), Some(value));
    }

    let stats = index.verify().unwrap();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.slots, 1u64 << stats.global_depth);
}

#[test]
fn test_colliding_low_bits_force_repeated_doubling() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_index(&temp_dir, 2);

    // Keys agree on their low three bits
    for key in [8u32, 16, 24] {
        index.put(key, key as u64).unwrap();
    }
    assert!(index.global_depth().unwrap() >= 4);
    for key in [8u32, 16, 24] {
        assert_eq!(index.get(key).unwrap(), Some(key as u64));
    }
    index.verify().unwrap();
}

#[test]
fn test_overwrite_never_grows_directory() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_index(&temp_dir, 2);
    index.put(4, 0).unwrap();
    index.put(6, 0).unwrap();
    let depth = index.global_depth().unwrap();

    for round in 0..200u64 {
        index.put(4, round).unwrap();
    }

    assert_eq!(index.global_depth().unwrap(), depth);
    assert_eq!(index.get(4).unwrap(), Some(199));
    assert_eq!(index.len().unwrap(), 2);
}

#[test]
fn test_depth_limit_leaves_index_usable() {
    let temp_dir = TempDir::new().unwrap();
    let config = IndexConfig {
        bucket_capacity: 2,
        max_global_depth: 3,
        lock_policy: LockPolicy::default(),
    };
    let mut index = HashIndex::open(&index_path(&temp_dir), config).unwrap();

    index.put(0, 1).unwrap();
    index.put(8, 2).unwrap();
    let err = index.put(16, 3).unwrap_err();
    assert!(matches!(err, IndexError::DepthExceeded { max: 3 }));

    // Keys with other low bits still go in
    index.put(1, 4).unwrap();
    assert_eq!(index.get(0).unwrap(), Some(1));
    assert_eq!(index.get(8).unwrap(), Some(2));
    assert_eq!(index.get(16).unwrap(), None);
    index.verify().unwrap();
}

// =============================================================================
// Randomized Workloads
// =============================================================================

#[test]
fn test_random_keys_all_retrievable() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_index(&temp_dir, 4);
    let mut rng = StdRng::seed_from_u64(0x1dec);
    let mut expected = HashMap::new();

    for _ in 0..600 {
        let key = rng.gen_range(1..5_000u32);
        let value = rng.gen::<u64>();
        index.put(key, value).unwrap();
        expected.insert(key, value);
    }

    for (key, value) in &expected {
        assert_eq!(index.get(*key).unwrap(), Some(*value), "key {}", key);
    }
    let stats = index.verify().unwrap();
    assert_eq!(stats.entries, expected.len() as u64);
    assert!(stats.max_local_depth <= stats.global_depth);
}

#[test]
fn test_sequential_ids_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut index = open_index(&temp_dir, 31);
        for id in 1..=1_000u32 {
            index.put(id, id as u64 * 64).unwrap();
        }
    }

    let index = open_index(&temp_dir, 31);
    for id in 1..=1_000u32 {
        assert_eq!(index.get(id).unwrap(), Some(id as u64 * 64));
    }
    assert_eq!(index.get(1_001).unwrap(), None);
}

#[test]
fn test_second_handle_sees_puts() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = open_index(&temp_dir, 2);
    let reader = open_index(&temp_dir, 2);

    for key in 0..20u32 {
        writer.put(key, key as u64 + 7).unwrap();
        assert_eq!(reader.get(key).unwrap(), Some(key as u64 + 7));
    }
    assert_eq!(reader.global_depth().unwrap(), writer.global_depth().unwrap());
}
