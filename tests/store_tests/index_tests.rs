//! Tests for the bucket index
//!
//! These tests verify:
//! - Slot sizing from load factor and max offset
//! - Linear probing at full load
//! - Tombstones and backward-shift deletion
//! - Duplicate key handling

use palkv::hash::{hash_key, home_slot, HASH_SEED};
use palkv::store::BucketIndex;
use palkv::varint::packed_len;
use palkv::PalError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Fixed-width 8-byte keys
fn key(i: u32) -> Vec<u8> {
    format!("k{:07}", i).into_bytes()
}

fn items(count: u32) -> Vec<(Vec<u8>, u64)> {
    (0..count).map(|i| (key(i), i as u64 + 1)).collect()
}

// =============================================================================
// Hash Tests
// =============================================================================

#[test]
fn test_hash_is_xxh32_seed_42() {
    assert_eq!(HASH_SEED, 42);
    assert_eq!(hash_key(b"abc"), xxhash_rust_reference(b"abc"));
    assert_eq!(hash_key(b"abc"), hash_key(b"abc"));
    assert_ne!(hash_key(b"abc"), hash_key(b"abd"));
}

fn xxhash_rust_reference(key: &[u8]) -> u32 {
    xxhash_rust::xxh32::xxh32(key, 42)
}

#[test]
fn test_home_slot_in_range() {
    for i in 0..100 {
        assert!(home_slot(&key(i), 7) < 7);
    }
}

// =============================================================================
// Sizing Tests
// =============================================================================

#[test]
fn test_slot_sizing() {
    let index = BucketIndex::new(8, 3, 1_000, 0.75).unwrap();
    assert_eq!(index.num_slots(), 4);
    assert_eq!(index.slot_size(), 8 + packed_len(1_000));
    assert_eq!(index.as_bytes().len(), 4 * index.slot_size());
    assert!(index.as_bytes().iter().all(|&b| b == 0));
}

#[test]
fn test_full_load_has_one_slot_per_item() {
    let index = BucketIndex::new(8, 10, 10, 1.0).unwrap();
    assert_eq!(index.num_slots(), 10);
}

#[test]
fn test_invalid_load_factor() {
    for load_factor in [0.0, -0.5, 1.5, f64::NAN] {
        let err = BucketIndex::new(8, 10, 10, load_factor).unwrap_err();
        assert!(matches!(err, PalError::Config(_)));
    }
}

// =============================================================================
// Insert / Get Tests
// =============================================================================

#[test]
fn test_build_and_get() {
    let items = items(100);
    let index = BucketIndex::build(8, &items, 100, 0.75, false).unwrap();

    assert_eq!(index.num_keys(), 100);
    for (key, offset) in &items {
        assert_eq!(index.get(key), Some(*offset));
    }
    assert_eq!(index.get(b"missing!"), None);
    assert_eq!(index.get(b"short"), None);
}

#[test]
fn test_full_load_finds_every_key() {
    let items = items(1_000);
    let index = BucketIndex::build(8, &items, 1_000, 1.0, false).unwrap();

    assert_eq!(index.num_slots(), 1_000);
    assert_eq!(index.num_keys(), 1_000);
    for (key, offset) in &items {
        assert_eq!(index.get(key), Some(*offset));
    }
}

#[test]
fn test_duplicate_key_rejected() {
    let items = vec![(key(1), 1), (key(1), 5)];
    let err = BucketIndex::build(8, &items, 5, 0.75, false).unwrap_err();
    match err {
        PalError::DuplicateKey { key_size, key } => {
            assert_eq!(key_size, 8);
            assert_eq!(key, "6b30303030303031");
        }
        other => panic!("expected DuplicateKey, got {:?}", other),
    }
}

#[test]
fn test_no_distinct_last_write_wins() {
    let items = vec![(key(1), 1), (key(2), 3), (key(1), 5)];
    let index = BucketIndex::build(8, &items, 5, 0.75, true).unwrap();

    assert_eq!(index.num_keys(), 2);
    assert_eq!(index.get(&key(1)), Some(5));
    assert_eq!(index.get(&key(2)), Some(3));
}

#[test]
fn test_wrong_key_width() {
    let mut index = BucketIndex::new(8, 1, 10, 1.0).unwrap();
    let err = index.insert(b"abc", 1, false).unwrap_err();
    assert!(matches!(err, PalError::InvalidEntry(_)));
}

#[test]
fn test_offset_wider_than_slot() {
    let mut index = BucketIndex::new(8, 1, 10, 1.0).unwrap();
    let err = index.insert(&key(1), 1 << 20, false).unwrap_err();
    assert!(matches!(err, PalError::Capacity(_)));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_tombstone_removes_key() {
    let items = vec![(key(1), 1), (key(2), 3), (key(1), 0)];
    let index = BucketIndex::build(8, &items, 3, 0.75, false).unwrap();

    assert_eq!(index.num_keys(), 1);
    assert_eq!(index.get(&key(1)), None);
    assert_eq!(index.get(&key(2)), Some(3));
}

#[test]
fn test_tombstone_for_absent_key_is_noop() {
    let items = vec![(key(1), 0), (key(2), 1)];
    let index = BucketIndex::build(8, &items, 1, 0.75, false).unwrap();

    assert_eq!(index.num_keys(), 1);
    assert_eq!(index.get(&key(1)), None);
}

#[test]
fn test_put_after_delete_is_not_duplicate() {
    let items = vec![(key(1), 1), (key(1), 0), (key(1), 9)];
    let index = BucketIndex::build(8, &items, 9, 0.75, false).unwrap();

    assert_eq!(index.num_keys(), 1);
    assert_eq!(index.get(&key(1)), Some(9));
}

#[test]
fn test_deletions_keep_probe_chains_intact() {
    // A full table is one long cluster; deleting every third key must not
    // hide any key that probed past a deleted one.
    let count = 600;
    let mut index = BucketIndex::new(8, count as usize, count as u64, 1.0).unwrap();
    for (key, offset) in items(count) {
        index.insert(&key, offset, false).unwrap();
    }
    for i in (0..count).step_by(3) {
        index.insert(&key(i), 0, false).unwrap();
    }

    assert_eq!(index.num_keys(), 400);
    for i in 0..count {
        let expected = if i % 3 == 0 { None } else { Some(i as u64 + 1) };
        assert_eq!(index.get(&key(i)), expected, "key {}", i);
    }
}

#[test]
fn test_reinsert_after_deletions() {
    let count = 200;
    let mut index = BucketIndex::new(8, count as usize * 2, count as u64 * 2, 1.0).unwrap();
    for (key, offset) in items(count) {
        index.insert(&key, offset, false).unwrap();
    }
    for i in 0..count {
        index.insert(&key(i), 0, false).unwrap();
    }
    assert_eq!(index.num_keys(), 0);
    assert!(index.as_bytes().iter().all(|&b| b == 0));

    for (key, offset) in items(count) {
        index.insert(&key, offset + 1, false).unwrap();
    }
    for i in 0..count {
        assert_eq!(index.get(&key(i)), Some(i as u64 + 2));
    }
}
