//! Store Writer
//!
//! Assembles a store file from built partitions: prelude (header,
//! descriptors, metadata, global offsets), then every slot array, then every
//! value log, all in ascending key length.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::error::{PalError, Result};

use super::format::{fit_u32, fit_u48, now_millis, GlobalOffsets, Header, PartitionDescriptor};
use super::partition::PartitionSet;
use super::{DESCRIPTOR_SIZE, HEADER_SIZE, METADATA_LEN_SIZE, OFFSETS_SIZE};

/// What ended up on disk
#[derive(Debug, Clone)]
pub struct WrittenStore {
    pub header: Header,
    pub descriptors: Vec<PartitionDescriptor>,
    pub offsets: GlobalOffsets,
    pub file_size: u64,
}

/// Writes one store file
pub struct StoreWriter {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Bytes written so far
    written: u64,
}

impl StoreWriter {
    /// Create (or truncate) the output file
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Lay out and write the whole store, then fsync it.
    ///
    /// Every field is range-checked before the first byte is written.
    pub fn write(mut self, set: &mut PartitionSet, metadata: &[u8]) -> Result<WrittenStore> {
        let (header, descriptors, offsets) = plan(set, metadata, now_millis())?;

        let prelude_len = offsets.index_offset as usize;
        let mut prelude = BytesMut::with_capacity(prelude_len);
        header.encode(&mut prelude);
        for descriptor in &descriptors {
            descriptor.encode(&mut prelude);
        }
        prelude.put_u32(metadata.len() as u32);
        prelude.put_slice(metadata);
        offsets.encode(&mut prelude);
        debug_assert_eq!(prelude.len(), prelude_len);
        self.put(&prelude)?;

        for partition in &set.partitions {
            self.put(partition.index.as_bytes())?;
        }
        for partition in &mut set.partitions {
            self.written += partition.log.copy_to(&mut self.writer)?;
        }

        if self.written != offsets.data_offset + set.partitions.iter().map(|p| p.data_size()).sum::<u64>() {
            return Err(PalError::Corruption(format!(
                "{}: wrote {} bytes, layout expected a different size",
                self.path.display(),
                self.written
            )));
        }

        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| PalError::Io(e.into_error()))?;
        file.sync_all()?;

        debug!(
            path = %self.path.display(),
            bytes = self.written,
            partitions = descriptors.len(),
            "Wrote store file"
        );

        Ok(WrittenStore {
            header,
            descriptors,
            offsets,
            file_size: self.written,
        })
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Compute header, descriptors and global offsets for `set`
fn plan(
    set: &PartitionSet,
    metadata: &[u8],
    timestamp: u64,
) -> Result<(Header, Vec<PartitionDescriptor>, GlobalOffsets)> {
    let mut descriptors = Vec::with_capacity(set.partitions.len());
    let mut index_offset: u64 = 0;
    let mut data_offset: u64 = 0;

    for partition in &set.partitions {
        let index = partition.index();
        descriptors.push(PartitionDescriptor {
            key_size: fit_u32(index.key_size() as u64, "key size")?,
            num_keys: fit_u32(index.num_keys(), "partition key count")?,
            num_slots: fit_u32(index.num_slots(), "partition slot count")?,
            slot_size: fit_u32(index.slot_size() as u64, "slot size")?,
            index_offset: fit_u32(index_offset, "partition index offset")?,
            data_offset: fit_u48(data_offset, "partition data offset")?,
        });
        index_offset += index.as_bytes().len() as u64;
        data_offset += partition.data_size();
    }

    let prelude_len = (HEADER_SIZE
        + DESCRIPTOR_SIZE * descriptors.len()
        + METADATA_LEN_SIZE
        + metadata.len()
        + OFFSETS_SIZE) as u64;

    let header = Header {
        flags: 0,
        timestamp,
        num_values: fit_u32(set.num_values, "value count")?,
        num_partitions: fit_u32(descriptors.len() as u64, "partition count")?,
        max_key_size: fit_u32(set.max_key_size as u64, "max key size")?,
    };
    fit_u32(metadata.len() as u64, "metadata length")?;

    let offsets = GlobalOffsets {
        index_offset: fit_u32(prelude_len, "index region offset")?,
        data_offset: fit_u48(prelude_len + index_offset, "data region offset")?,
    };
    // Partition data offsets are relative, the end of the file must still be addressable.
    fit_u48(offsets.data_offset + data_offset, "store size")?;

    Ok((header, descriptors, offsets))
}
