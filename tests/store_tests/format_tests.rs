//! Tests pinning the on-disk layout byte for byte
//!
//! Store used throughout (compaction off, load factor 1):
//! - `ab`  → `xyz`
//! - `abc` → `` (empty value)
//! - delete `zzz` (never added)
//! - metadata `m`
//!
//! ```text
//!   0..31    header
//!  31..59    descriptor, 2-byte keys
//!  59..87    descriptor, 3-byte keys
//!  87..92    metadata length + "m"
//!  92..104   global offsets
//! 104..107   slot array, 2-byte keys (1 slot × 3 bytes)
//! 107..115   slot array, 3-byte keys (2 slots × 4 bytes)
//! 115..120   value log, 2-byte keys
//! 120..122   value log, 3-byte keys
//! ```

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use palkv::hash::home_slot;
use palkv::{Config, StoreBuilder, StoreReader};

use super::setup_temp_store;

// =============================================================================
// Helper Functions
// =============================================================================

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

fn be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |n, &b| (n << 8) | b as u64)
}

/// Build the reference store, returning its bytes and the build time window
fn build_reference_store() -> (Vec<u8>, u64, u64) {
    let (_temp, path) = setup_temp_store();
    let config = Config::builder()
        .load_factor(1.0)
        .compaction_threshold(0.0)
        .metadata("m")
        .build();

    let before = now_millis();
    let mut builder = StoreBuilder::new(&path, config).unwrap();
    builder.add(b"ab", b"xyz").unwrap();
    builder.add(b"abc", b"").unwrap();
    builder.delete(b"zzz").unwrap();
    builder.finish().unwrap();
    let after = now_millis();

    (fs::read(&path).unwrap(), before, after)
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_file_size() {
    let (bytes, _, _) = build_reference_store();
    assert_eq!(bytes.len(), 122);
}

#[test]
fn test_header_layout() {
    let (bytes, before, after) = build_reference_store();

    assert_eq!(&bytes[0..2], &[0x00, 0x09]);
    assert_eq!(&bytes[2..11], b"VERSION_1");
    // Flags
    assert_eq!(&bytes[11..13], &[0x00, 0x00]);
    // 48-bit creation timestamp
    let timestamp = be(&bytes[13..19]);
    assert!(before <= timestamp && timestamp <= after, "timestamp {}", timestamp);
    // Values (tombstone included), partitions, max key size
    assert_eq!(&bytes[19..23], &[0, 0, 0, 3]);
    assert_eq!(&bytes[23..27], &[0, 0, 0, 2]);
    assert_eq!(&bytes[27..31], &[0, 0, 0, 3]);
}

#[test]
fn test_descriptor_layout() {
    let (bytes, _, _) = build_reference_store();

    #[rustfmt::skip]
    let two_byte_keys: [u8; 28] = [
        0, 0, 0, 2,          // key size
        0, 0, 0, 1,          // live keys
        0, 0, 0, 1,          // slots
        0, 0, 0, 3,          // slot size: key + 1-byte offset
        0, 0, 0, 0,          // index offset
        0, 0,                // reserved
        0, 0, 0, 0, 0, 0,    // data offset
    ];
    #[rustfmt::skip]
    let three_byte_keys: [u8; 28] = [
        0, 0, 0, 3,
        0, 0, 0, 1,          // `zzz` was never live
        0, 0, 0, 2,          // 2 entries at load factor 1
        0, 0, 0, 4,
        0, 0, 0, 3,          // after one 3-byte slot
        0, 0,
        0, 0, 0, 0, 0, 5,    // after the 5-byte log of 2-byte keys
    ];

    assert_eq!(&bytes[31..59], &two_byte_keys);
    assert_eq!(&bytes[59..87], &three_byte_keys);
}

#[test]
fn test_metadata_and_global_offsets() {
    let (bytes, _, _) = build_reference_store();

    assert_eq!(&bytes[87..91], &[0, 0, 0, 1]);
    assert_eq!(bytes[91], b'm');

    #[rustfmt::skip]
    let offsets: [u8; 12] = [
        0, 0, 0, 104,        // index region
        0, 0,                // reserved
        0, 0, 0, 0, 0, 115,  // data region
    ];
    assert_eq!(&bytes[92..104], &offsets);
}

#[test]
fn test_slot_layout() {
    let (bytes, _, _) = build_reference_store();

    // key || packed offset, zero padded to the slot width
    assert_eq!(&bytes[104..107], &[b'a', b'b', 0x01]);

    let three_byte_slots = &bytes[107..115];
    let home = home_slot(b"abc", 2) as usize;
    let other = 1 - home;
    assert_eq!(&three_byte_slots[home * 4..home * 4 + 4], &[b'a', b'b', b'c', 0x01]);
    assert_eq!(&three_byte_slots[other * 4..other * 4 + 4], &[0, 0, 0, 0]);
}

#[test]
fn test_value_log_layout() {
    let (bytes, _, _) = build_reference_store();

    // Reserved byte, then [len][value]
    assert_eq!(&bytes[115..120], &[0x00, 0x03, b'x', b'y', b'z']);
    // Reserved byte, then the empty value
    assert_eq!(&bytes[120..122], &[0x00, 0x00]);
}

#[test]
fn test_reference_store_reads_back() {
    let (_temp, path) = setup_temp_store();
    let (bytes, _, _) = build_reference_store();
    fs::write(&path, &bytes).unwrap();

    let reader = StoreReader::open(&path).unwrap();
    assert_eq!(reader.get(b"ab").unwrap(), Some(&b"xyz"[..]));
    assert_eq!(reader.get(b"abc").unwrap(), Some(&b""[..]));
    assert_eq!(reader.get(b"zzz").unwrap(), None);
    assert_eq!(reader.metadata(), b"m");

    let stats = reader.statistics();
    assert_eq!(stats.num_values, 3);
    assert_eq!(stats.num_keys, 2);
    assert_eq!(stats.index_size, 11);
    assert_eq!(stats.data_size, 7);
}
