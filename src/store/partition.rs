//! Partitioner
//!
//! Groups incoming entries by key length. Each partition owns a value log
//! in the staging directory and the `(key, offset)` list its index is built
//! from.

use std::collections::{btree_map, BTreeMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PalError, Result};

use super::index::BucketIndex;
use super::log::ValueLog;

/// Entries of one key length, before indexing
pub struct Partition {
    key_size: usize,
    /// Insertion-ordered (key, offset); offset 0 is a tombstone
    items: Vec<(Vec<u8>, u64)>,
    log: ValueLog,
}

impl Partition {
    /// Start a partition whose log lives in `dir`
    pub fn create(key_size: usize, dir: &Path) -> Result<Self> {
        let log = ValueLog::create(&Self::log_path(dir, key_size))?;
        Ok(Self {
            key_size,
            items: Vec::new(),
            log,
        })
    }

    /// Append a value (or record a tombstone for `None`)
    pub fn add_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.len() != self.key_size {
            return Err(PalError::InvalidEntry(format!(
                "key of {} bytes routed to the {}-byte partition",
                key.len(),
                self.key_size
            )));
        }

        let offset = match value {
            Some(value) => self.log.append(value)?,
            None => 0,
        };
        self.items.push((key.to_vec(), offset));
        Ok(())
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Entries recorded, tombstones included
    pub fn num_entries(&self) -> usize {
        self.items.len()
    }

    /// Flush the log and build the index
    pub fn build(mut self, load_factor: f64, no_distinct: bool) -> Result<BuiltPartition> {
        self.log.flush()?;

        let index = BucketIndex::build(
            self.key_size,
            &self.items,
            self.log.max_offset(),
            load_factor,
            no_distinct,
        )?;

        debug!(
            key_size = self.key_size,
            entries = self.items.len(),
            keys = index.num_keys(),
            slots = index.num_slots(),
            slot_size = index.slot_size(),
            data_size = self.log.len(),
            "Built partition index"
        );

        Ok(BuiltPartition {
            num_values: self.items.len() as u64,
            index,
            log: self.log,
        })
    }

    /// "partition_000012.log" for 12-byte keys
    fn log_path(dir: &Path, key_size: usize) -> PathBuf {
        dir.join(format!("partition_{:06}.log", key_size))
    }
}

/// A partition with its finished index, ready for assembly
pub struct BuiltPartition {
    pub(crate) index: BucketIndex,
    pub(crate) log: ValueLog,
    num_values: u64,
}

impl BuiltPartition {
    pub fn key_size(&self) -> usize {
        self.index.key_size()
    }

    pub fn num_keys(&self) -> u64 {
        self.index.num_keys()
    }

    pub fn num_values(&self) -> u64 {
        self.num_values
    }

    pub fn index(&self) -> &BucketIndex {
        &self.index
    }

    /// Value log size, reserved byte included
    pub fn data_size(&self) -> u64 {
        self.log.len()
    }
}

/// All built partitions, ascending key length
pub struct PartitionSet {
    pub partitions: Vec<BuiltPartition>,
    /// Live keys across partitions
    pub num_keys: u64,
    /// Entries across partitions, tombstones included
    pub num_values: u64,
    pub max_key_size: usize,
}

/// Routes entries to per-key-length partitions
pub struct Partitioner {
    /// Directory holding the value logs
    dir: PathBuf,
    /// Partitions by key length (ascending iteration order)
    partitions: BTreeMap<usize, Partition>,
}

impl Partitioner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            partitions: BTreeMap::new(),
        }
    }

    /// Route an entry by key length, creating its partition on first use
    pub fn add_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.is_empty() {
            return Err(PalError::InvalidEntry("empty key".to_string()));
        }
        if u32::try_from(key.len()).is_err() {
            return Err(PalError::InvalidEntry(format!(
                "key of {} bytes is too long",
                key.len()
            )));
        }

        let partition = match self.partitions.entry(key.len()) {
            btree_map::Entry::Occupied(slot) => slot.into_mut(),
            btree_map::Entry::Vacant(slot) => {
                debug!(key_size = key.len(), "Opening partition");
                slot.insert(Partition::create(key.len(), &self.dir)?)
            }
        };
        partition.add_entry(key, value)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Entries recorded, tombstones included
    pub fn num_values(&self) -> u64 {
        self.partitions.values().map(|p| p.num_entries() as u64).sum()
    }

    /// Build every partition index.
    ///
    /// Partitions share nothing, so with `parallel` they are dealt out to at
    /// most `available_parallelism` scoped workers; all of them are joined
    /// before returning.
    pub fn build(self, load_factor: f64, no_distinct: bool, parallel: bool) -> Result<PartitionSet> {
        let max_key_size = self.partitions.keys().next_back().copied().unwrap_or(0);
        let partitions: Vec<Partition> = self.partitions.into_values().collect();
        let workers = if parallel { worker_count(partitions.len()) } else { 1 };

        let results: Vec<Result<BuiltPartition>> = if workers > 1 {
            let mut shares: Vec<Vec<(usize, Partition)>> = (0..workers).map(|_| Vec::new()).collect();
            for (i, partition) in partitions.into_iter().enumerate() {
                shares[i % workers].push((i, partition));
            }

            let mut built = crossbeam::thread::scope(|scope| {
                let handles: Vec<_> = shares
                    .into_iter()
                    .map(|share| {
                        scope.spawn(move |_| {
                            share
                                .into_iter()
                                .map(|(i, partition)| (i, partition.build(load_factor, no_distinct)))
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

            // Back to ascending key length
            built.sort_unstable_by_key(|(i, _)| *i);
            built.into_iter().map(|(_, result)| result).collect()
        } else {
            partitions
                .into_iter()
                .map(|partition| partition.build(load_factor, no_distinct))
                .collect()
        };

        let partitions = results.into_iter().collect::<Result<Vec<_>>>()?;
        let num_keys = partitions.iter().map(BuiltPartition::num_keys).sum();
        let num_values = partitions.iter().map(BuiltPartition::num_values).sum();

        Ok(PartitionSet {
            partitions,
            num_keys,
            num_values,
            max_key_size,
        })
    }
}

/// Scoped workers for `partitions` builds, capped by the available cores
fn worker_count(partitions: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(partitions).max(1)
}
