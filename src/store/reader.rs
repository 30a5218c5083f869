//! Store Reader
//!
//! Memory-maps a store file and serves point lookups by probing the slot
//! array of the partition matching the key length.

use std::collections::{btree_map, BTreeMap};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use bytes::Buf;
use memmap2::Mmap;
use tracing::debug;

use crate::error::{PalError, Result};
use crate::hash::home_slot;
use crate::varint;

use super::format::{ensure, GlobalOffsets, Header, PartitionDescriptor};
use super::iterator::StoreIterator;
use super::{MARKER, MARKER_PREFIX};

/// Store-level figures, straight from the header and descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Milliseconds since the Unix epoch
    pub creation_timestamp: u64,
    /// Entries ingested by the build, tombstones included
    pub num_values: u64,
    /// Live keys
    pub num_keys: u64,
    pub num_partitions: u64,
    /// Bytes in the index region
    pub index_size: u64,
    /// Bytes in the data region
    pub data_size: u64,
}

/// A partition resolved to absolute byte ranges of the mapping
#[derive(Debug, Clone)]
pub(super) struct PartitionView {
    pub(super) key_size: usize,
    pub(super) num_keys: u64,
    pub(super) num_slots: u64,
    pub(super) slot_size: usize,
    pub(super) index: Range<usize>,
    pub(super) data: Range<usize>,
}

/// Read-only handle on a store file
pub struct StoreReader {
    /// Path the store was opened from
    path: PathBuf,
    /// Whole-file read-only mapping
    mmap: Mmap,
    header: Header,
    /// Partitions by key length
    partitions: BTreeMap<usize, PartitionView>,
    metadata: Range<usize>,
    index_region: Range<usize>,
    data_region: Range<usize>,
}

impl StoreReader {
    /// Open a store for reading
    ///
    /// Parses the prelude and validates every region against the file size;
    /// no value is read until it is asked for.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: store files are immutable once published (written to a
        // staging path, then renamed), and the mapping is read-only.
        let mmap = unsafe { Mmap::map(&file)? };

        let layout = parse_layout(&mmap)?;

        debug!(
            path = %path.display(),
            partitions = layout.partitions.len(),
            values = layout.header.num_values,
            "Opened store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header: layout.header,
            partitions: layout.partitions,
            metadata: layout.metadata,
            index_region: layout.index_region,
            data_region: layout.data_region,
        })
    }

    /// Look up a key
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key present (the value may be empty)
    /// - `Ok(None)`: key absent or deleted
    /// - `Err(Corruption)`: the slot or value record points outside the file
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        let partition = match self.partitions.get(&key.len()) {
            Some(partition) if partition.num_slots > 0 => partition,
            _ => return Ok(None),
        };

        let index = &self.mmap[partition.index.clone()];
        let mut slot = home_slot(key, partition.num_slots);

        for _ in 0..partition.num_slots {
            let start = slot as usize * partition.slot_size;
            let (slot_key, offset_field) =
                index[start..start + partition.slot_size].split_at(partition.key_size);

            if slot_key == key {
                let (offset, _) = varint::unpack(offset_field, 0)?;
                if offset == 0 {
                    // Present but deleted
                    return Ok(None);
                }
                return self.read_value(partition, offset).map(Some);
            }
            if offset_field[0] == 0 {
                return Ok(None);
            }

            slot += 1;
            if slot == partition.num_slots {
                slot = 0;
            }
        }

        Ok(None)
    }

    /// Whether `key` has a live value
    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Iterate over all live entries: ascending key length, then the order
    /// values were written in
    pub fn iter(&self) -> StoreIterator<'_> {
        StoreIterator::new(self)
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            creation_timestamp: self.header.timestamp,
            num_values: self.header.num_values as u64,
            num_keys: self.len(),
            num_partitions: self.partitions.len() as u64,
            index_size: self.index_region.len() as u64,
            data_size: self.data_region.len() as u64,
        }
    }

    /// Opaque metadata supplied at build time
    pub fn metadata(&self) -> &[u8] {
        &self.mmap[self.metadata.clone()]
    }

    /// Live keys across partitions
    pub fn len(&self) -> u64 {
        self.partitions.values().map(|p| p.num_keys).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_key_size(&self) -> usize {
        self.header.max_key_size as usize
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Crate-internal helpers (shared with the iterator)
    // =========================================================================

    pub(super) fn partition_views(&self) -> btree_map::Values<'_, usize, PartitionView> {
        self.partitions.values()
    }

    pub(super) fn index_bytes(&self, partition: &PartitionView) -> &[u8] {
        &self.mmap[partition.index.clone()]
    }

    /// Decode the value record at a partition-local offset
    pub(super) fn read_value(&self, partition: &PartitionView, offset: u64) -> Result<&[u8]> {
        let data = &self.mmap[partition.data.clone()];
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start > 0 && start < data.len())
            .ok_or_else(|| {
                PalError::Corruption(format!(
                    "value offset {} outside the {}-byte log of partition {}",
                    offset,
                    data.len(),
                    partition.key_size
                ))
            })?;

        let (len, value_start) = varint::unpack(data, start)?;
        let value_end = usize::try_from(len)
            .ok()
            .and_then(|len| value_start.checked_add(len))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                PalError::Corruption(format!(
                    "value of {} bytes at offset {} overruns partition {}",
                    len, offset, partition.key_size
                ))
            })?;

        Ok(&data[value_start..value_end])
    }

    /// Slot starts and offsets of live entries, sorted by value offset
    pub(super) fn live_slots(&self, partition: &PartitionView) -> Result<Vec<(u64, usize)>> {
        let index = self.index_bytes(partition);
        let mut live = Vec::with_capacity(partition.num_keys as usize);

        for start in (0..index.len()).step_by(partition.slot_size) {
            let offset_field = &index[start + partition.key_size..start + partition.slot_size];
            if offset_field[0] == 0 {
                continue;
            }
            let (offset, _) = varint::unpack(offset_field, 0)?;
            if offset != 0 {
                live.push((offset, start));
            }
        }

        live.sort_unstable_by_key(|&(offset, _)| offset);
        Ok(live)
    }
}

// =============================================================================
// Prelude Parsing
// =============================================================================

struct Layout {
    header: Header,
    partitions: BTreeMap<usize, PartitionView>,
    metadata: Range<usize>,
    index_region: Range<usize>,
    data_region: Range<usize>,
}

/// Locate the header by its marker and resolve every region.
///
/// Leading bytes before the header are ignored; all offsets are relative to
/// the first header byte.
fn parse_layout(bytes: &[u8]) -> Result<Layout> {
    let marker_pos = bytes
        .windows(MARKER_PREFIX.len())
        .position(|window| window == MARKER_PREFIX)
        .ok_or_else(|| PalError::Format("version marker not found".to_string()))?;

    let version = bytes.get(marker_pos + MARKER_PREFIX.len()).copied();
    if version != Some(MARKER[MARKER.len() - 1]) {
        return Err(PalError::Format(format!(
            "unsupported version: {}",
            version.map(|v| format!("VERSION_{}", v as char)).unwrap_or_else(|| "truncated".into())
        )));
    }

    if marker_pos < 2 || bytes[marker_pos - 2..marker_pos] != (MARKER.len() as u16).to_be_bytes() {
        return Err(PalError::Format("missing marker length prefix".to_string()));
    }
    let base = marker_pos - 2;

    let mut buf = &bytes[marker_pos + MARKER.len()..];
    let header = Header::decode_fields(&mut buf)?;

    let mut descriptors = Vec::new();
    for _ in 0..header.num_partitions {
        descriptors.push(PartitionDescriptor::decode(&mut buf)?);
    }

    ensure(&buf, 4, "metadata length")?;
    let metadata_len = buf.get_u32() as usize;
    ensure(&buf, metadata_len, "metadata")?;
    let metadata_start = bytes.len() - buf.remaining();
    buf.advance(metadata_len);

    let offsets = GlobalOffsets::decode(&mut buf)?;
    let prelude_end = bytes.len() - buf.remaining();

    let index_start = base + offsets.index_offset as usize;
    let data_start = usize::try_from(offsets.data_offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .filter(|&start| start <= bytes.len())
        .ok_or_else(|| {
            PalError::Format(format!("data region offset {} beyond end of file", offsets.data_offset))
        })?;
    if index_start < prelude_end || index_start > data_start {
        return Err(PalError::Format(format!(
            "index region offset {} inconsistent with prelude end {} and data offset {}",
            offsets.index_offset,
            prelude_end - base,
            offsets.data_offset
        )));
    }

    let index_region = index_start..data_start;
    let data_region = data_start..bytes.len();
    let partitions = resolve_partitions(&header, &descriptors, &index_region, &data_region)?;

    Ok(Layout {
        header,
        partitions,
        metadata: metadata_start..metadata_start + metadata_len,
        index_region,
        data_region,
    })
}

/// Turn descriptors into absolute, bounds-checked ranges
fn resolve_partitions(
    header: &Header,
    descriptors: &[PartitionDescriptor],
    index_region: &Range<usize>,
    data_region: &Range<usize>,
) -> Result<BTreeMap<usize, PartitionView>> {
    let mut partitions = BTreeMap::new();
    let mut previous_key_size = 0;

    for (i, descriptor) in descriptors.iter().enumerate() {
        let key_size = descriptor.key_size as usize;
        if key_size == 0 || key_size > header.max_key_size as usize || key_size <= previous_key_size {
            return Err(PalError::Format(format!(
                "descriptor {}: key size {} out of order or above max {}",
                i, key_size, header.max_key_size
            )));
        }
        previous_key_size = key_size;

        let slot_size = descriptor.slot_size as usize;
        if slot_size <= key_size || descriptor.num_keys > descriptor.num_slots {
            return Err(PalError::Format(format!(
                "descriptor {}: slot size {} / {} keys in {} slots is invalid",
                i, slot_size, descriptor.num_keys, descriptor.num_slots
            )));
        }

        let index = checked_range(
            index_region,
            descriptor.index_offset as u64,
            descriptor.index_size(),
        )
        .ok_or_else(|| {
            PalError::Format(format!("descriptor {}: index block outside the index region", i))
        })?;

        // A log runs up to the next partition's log (or the end of the region).
        let data_end = descriptors
            .get(i + 1)
            .map(|next| next.data_offset)
            .unwrap_or(data_region.len() as u64);
        let data = data_end
            .checked_sub(descriptor.data_offset)
            .and_then(|len| checked_range(data_region, descriptor.data_offset, len))
            .ok_or_else(|| {
                PalError::Format(format!("descriptor {}: value log outside the data region", i))
            })?;

        partitions.insert(
            key_size,
            PartitionView {
                key_size,
                num_keys: descriptor.num_keys as u64,
                num_slots: descriptor.num_slots as u64,
                slot_size,
                index,
                data,
            },
        );
    }

    Ok(partitions)
}

/// `region.start + offset .. + len`, if it stays inside `region`
fn checked_range(region: &Range<usize>, offset: u64, len: u64) -> Option<Range<usize>> {
    let start = region.start.checked_add(usize::try_from(offset).ok()?)?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    (end <= region.end).then_some(start..end)
}
