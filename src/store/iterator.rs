//! Store Iterator
//!
//! Sequential iteration over all live entries of a store.

use std::collections::btree_map;
use std::vec;

use crate::error::Result;

use super::reader::{PartitionView, StoreReader};

/// Iterator over live entries: ascending key length, then value-log order.
///
/// Only the slot list of the partition being walked is held in memory.
pub struct StoreIterator<'a> {
    reader: &'a StoreReader,
    /// Partitions not yet entered
    partitions: btree_map::Values<'a, usize, PartitionView>,
    /// Partition being walked and its remaining (offset, slot start) pairs
    current: Option<(&'a PartitionView, vec::IntoIter<(u64, usize)>)>,
    /// Set after an error; the iterator is fused from then on
    failed: bool,
}

impl<'a> StoreIterator<'a> {
    pub(super) fn new(reader: &'a StoreReader) -> Self {
        Self {
            reader,
            partitions: reader.partition_views(),
            current: None,
            failed: false,
        }
    }
}

impl<'a> Iterator for StoreIterator<'a> {
    /// (key, value), both borrowed from the mapping
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let reader: &'a StoreReader = self.reader;
        loop {
            if let Some((partition, slots)) = &mut self.current {
                let partition: &'a PartitionView = *partition;
                if let Some((offset, slot_start)) = slots.next() {
                    let index = reader.index_bytes(partition);
                    let key = &index[slot_start..slot_start + partition.key_size];
                    let item = reader.read_value(partition, offset).map(|value| (key, value));
                    self.failed = item.is_err();
                    return Some(item);
                }
            }

            // Current partition exhausted (or none yet): move to the next one.
            let partition = self.partitions.next()?;
            match reader.live_slots(partition) {
                Ok(slots) => self.current = Some((partition, slots.into_iter())),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
