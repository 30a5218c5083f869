//! Bucket Index
//!
//! Open-addressing hash table over fixed-width keys of one length.
//!
//! ## Slot layout
//! ```text
//! ┌──────────────────────┬──────────────────────────────────┐
//! │ key (key_size bytes) │ varint offset, zero padded       │
//! └──────────────────────┴──────────────────────────────────┘
//!   slot_size = key_size + packed_len(max_offset)
//! ```
//!
//! A slot is vacant when the first offset byte is zero: packed offsets ≥ 1
//! never start with a zero byte. Collisions use single-step linear probing
//! with wraparound.

use crate::config::validate_load_factor;
use crate::error::{PalError, Result};
use crate::hash::home_slot;
use crate::varint;

/// Outcome of probing for a key
enum Probe {
    /// Slot already holding the key
    Found(u64),
    /// First vacant slot of the key's chain
    Vacant(u64),
    /// Every slot visited without meeting the key or a vacancy
    Full,
}

/// Builder-side slot array for one partition
#[derive(Debug, Clone)]
pub struct BucketIndex {
    key_size: usize,
    num_keys: u64,
    num_slots: u64,
    slot_size: usize,
    slots: Vec<u8>,
}

impl BucketIndex {
    /// Size an empty index for `item_count` insertions whose offsets never
    /// exceed `max_offset`
    pub fn new(key_size: usize, item_count: usize, max_offset: u64, load_factor: f64) -> Result<Self> {
        validate_load_factor(load_factor)?;

        let num_slots = ((item_count as f64 / load_factor).floor() as u64).max(item_count as u64);
        let slot_size = key_size + varint::packed_len(max_offset);
        let len = usize::try_from(num_slots)
            .ok()
            .and_then(|n| n.checked_mul(slot_size))
            .ok_or_else(|| {
                PalError::Capacity(format!(
                    "index of {} slots × {} bytes is too large",
                    num_slots, slot_size
                ))
            })?;

        Ok(Self {
            key_size,
            num_keys: 0,
            num_slots,
            slot_size,
            slots: vec![0u8; len],
        })
    }

    /// Build an index from `(key, offset)` pairs in insertion order.
    ///
    /// Offset 0 deletes the key. A second live offset for a key is a
    /// duplicate unless `no_distinct` is set, in which case the last one wins.
    pub fn build(
        key_size: usize,
        items: &[(Vec<u8>, u64)],
        max_offset: u64,
        load_factor: f64,
        no_distinct: bool,
    ) -> Result<Self> {
        let mut index = Self::new(key_size, items.len(), max_offset, load_factor)?;
        for (key, offset) in items {
            index.insert(key, *offset, no_distinct)?;
        }
        Ok(index)
    }

    /// Insert, overwrite or delete (offset 0) a key
    pub fn insert(&mut self, key: &[u8], offset: u64, no_distinct: bool) -> Result<()> {
        if key.len() != self.key_size {
            return Err(PalError::InvalidEntry(format!(
                "key of {} bytes in a {}-byte partition",
                key.len(),
                self.key_size
            )));
        }
        if varint::packed_len(offset) > self.offset_width() {
            return Err(PalError::Capacity(format!(
                "offset {} is wider than the {}-byte slot field",
                offset,
                self.offset_width()
            )));
        }

        match (self.probe(key), offset) {
            (Probe::Found(slot), 0) => {
                self.remove_at(slot);
                self.num_keys -= 1;
            }
            (Probe::Vacant(_), 0) | (Probe::Full, 0) => {}
            (Probe::Vacant(slot), _) => {
                self.write_slot(slot, key, offset);
                self.num_keys += 1;
            }
            (Probe::Found(slot), _) => {
                if !no_distinct {
                    return Err(PalError::duplicate_key(key));
                }
                self.write_slot(slot, key, offset);
            }
            (Probe::Full, _) => panic!(
                "probe chain exceeded {} slots in {}-byte partition",
                self.num_slots, self.key_size
            ),
        }
        Ok(())
    }

    /// Offset currently stored for `key`
    pub fn get(&self, key: &[u8]) -> Option<u64> {
        if key.len() != self.key_size {
            return None;
        }
        match self.probe(key) {
            Probe::Found(slot) => varint::unpack(self.offset_field(slot), 0)
                .ok()
                .map(|(offset, _)| offset)
                .filter(|&offset| offset != 0),
            Probe::Vacant(_) | Probe::Full => None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Live keys
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    pub fn num_slots(&self) -> u64 {
        self.num_slots
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Serialized slot array
    pub fn as_bytes(&self) -> &[u8] {
        &self.slots
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn offset_width(&self) -> usize {
        self.slot_size - self.key_size
    }

    fn slot_start(&self, slot: u64) -> usize {
        slot as usize * self.slot_size
    }

    fn key_at(&self, slot: u64) -> &[u8] {
        let start = self.slot_start(slot);
        &self.slots[start..start + self.key_size]
    }

    fn offset_field(&self, slot: u64) -> &[u8] {
        let start = self.slot_start(slot) + self.key_size;
        &self.slots[start..start + self.offset_width()]
    }

    fn is_vacant(&self, slot: u64) -> bool {
        self.slots[self.slot_start(slot) + self.key_size] == 0
    }

    fn probe(&self, key: &[u8]) -> Probe {
        if self.num_slots == 0 {
            return Probe::Full;
        }
        let mut slot = home_slot(key, self.num_slots);
        for _ in 0..self.num_slots {
            if self.is_vacant(slot) {
                return Probe::Vacant(slot);
            }
            if self.key_at(slot) == key {
                return Probe::Found(slot);
            }
            slot = (slot + 1) % self.num_slots;
        }
        Probe::Full
    }

    fn write_slot(&mut self, slot: u64, key: &[u8], offset: u64) {
        let start = self.slot_start(slot);
        let end = start + self.slot_size;
        let entry = &mut self.slots[start..end];
        entry.fill(0);
        entry[..self.key_size].copy_from_slice(key);
        varint::pack_into(offset, &mut entry[self.key_size..]);
    }

    fn clear_slot(&mut self, slot: u64) {
        let start = self.slot_start(slot);
        self.slots[start..start + self.slot_size].fill(0);
    }

    /// Empty `hole` and shift later members of its cluster back so that no
    /// key ends up behind a vacancy on its probe path.
    fn remove_at(&mut self, mut hole: u64) {
        self.clear_slot(hole);

        let mut next = (hole + 1) % self.num_slots;
        while !self.is_vacant(next) {
            let home = home_slot(self.key_at(next), self.num_slots);
            // Stays put iff its home lies cyclically in (hole, next].
            let stays = if hole <= next {
                hole < home && home <= next
            } else {
                hole < home || home <= next
            };
            if !stays {
                let from = self.slot_start(next);
                let to = self.slot_start(hole);
                self.slots.copy_within(from..from + self.slot_size, to);
                self.clear_slot(next);
                hole = next;
            }
            next = (next + 1) % self.num_slots;
        }
    }
}
