//! Bucket hash
//!
//! Builders and readers must agree on where a key lives, so the hash is
//! fixed: xxHash32 with a constant seed. It is stable across processes and
//! platforms; nothing here relies on it being collision resistant.

use xxhash_rust::xxh32::xxh32;

/// Seed shared by every store
pub const HASH_SEED: u32 = 42;

/// Hash a key for slot placement
#[inline]
pub fn hash_key(key: &[u8]) -> u32 {
    xxh32(key, HASH_SEED)
}

/// Home slot of `key` in a table of `num_slots` slots
#[inline]
pub fn home_slot(key: &[u8], num_slots: u64) -> u64 {
    hash_key(key) as u64 % num_slots
}
