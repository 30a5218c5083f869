//! Store Format
//!
//! Fixed-width records of the store prelude: header, partition descriptors
//! and global offsets. Encoding goes through `BytesMut`, decoding reads a
//! `&[u8]` cursor and never panics on short input.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{PalError, Result};

use super::{HEADER_SIZE, MARKER, MAX_U48};

/// Store header, minus the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Reserved, always 0
    pub flags: u16,
    /// Creation time, milliseconds since the Unix epoch (48 bits)
    pub timestamp: u64,
    /// Entries ingested, tombstones included
    pub num_values: u32,
    /// Number of partition descriptors that follow
    pub num_partitions: u32,
    /// Longest key length present
    pub max_key_size: u32,
}

impl Header {
    /// Bytes following the marker
    const FIELDS_SIZE: usize = HEADER_SIZE - 2 - MARKER.len();

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(MARKER.len() as u16);
        buf.put_slice(MARKER);
        buf.put_u16(self.flags);
        buf.put_uint(self.timestamp & MAX_U48, 6);
        buf.put_u32(self.num_values);
        buf.put_u32(self.num_partitions);
        buf.put_u32(self.max_key_size);
    }

    /// Decode the fields that follow the marker
    pub fn decode_fields(buf: &mut &[u8]) -> Result<Self> {
        ensure(buf, Self::FIELDS_SIZE, "header")?;
        Ok(Self {
            flags: buf.get_u16(),
            timestamp: buf.get_uint(6),
            num_values: buf.get_u32(),
            num_partitions: buf.get_u32(),
            max_key_size: buf.get_u32(),
        })
    }
}

/// Per-partition entry of the descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub key_size: u32,
    /// Live keys only
    pub num_keys: u32,
    pub num_slots: u32,
    pub slot_size: u32,
    /// Relative to the start of the index region
    pub index_offset: u32,
    /// Relative to the start of the data region (48 bits)
    pub data_offset: u64,
}

impl PartitionDescriptor {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.key_size);
        buf.put_u32(self.num_keys);
        buf.put_u32(self.num_slots);
        buf.put_u32(self.slot_size);
        buf.put_u32(self.index_offset);
        buf.put_u16(0);
        buf.put_uint(self.data_offset, 6);
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        ensure(buf, super::DESCRIPTOR_SIZE, "partition descriptor")?;
        let key_size = buf.get_u32();
        let num_keys = buf.get_u32();
        let num_slots = buf.get_u32();
        let slot_size = buf.get_u32();
        let index_offset = buf.get_u32();
        let _reserved = buf.get_u16();
        let data_offset = buf.get_uint(6);
        Ok(Self {
            key_size,
            num_keys,
            num_slots,
            slot_size,
            index_offset,
            data_offset,
        })
    }

    /// Size of this partition's slot array
    pub fn index_size(&self) -> u64 {
        self.num_slots as u64 * self.slot_size as u64
    }
}

/// Absolute region offsets, measured from the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalOffsets {
    pub index_offset: u32,
    /// 48 bits
    pub data_offset: u64,
}

impl GlobalOffsets {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.index_offset);
        buf.put_u16(0);
        buf.put_uint(self.data_offset, 6);
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        ensure(buf, super::OFFSETS_SIZE, "global offsets")?;
        let index_offset = buf.get_u32();
        let _reserved = buf.get_u16();
        let data_offset = buf.get_uint(6);
        Ok(Self {
            index_offset,
            data_offset,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Fail with a format error unless `needed` bytes remain
pub(crate) fn ensure(buf: &&[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(PalError::Format(format!(
            "truncated {}: need {} bytes, {} left",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Narrow a count or offset to a 4-byte field
pub(crate) fn fit_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| PalError::Capacity(format!("{} {} does not fit in 32 bits", what, value)))
}

/// Check a count or offset against a 6-byte field
pub(crate) fn fit_u48(value: u64, what: &str) -> Result<u64> {
    if value > MAX_U48 {
        return Err(PalError::Capacity(format!(
            "{} {} does not fit in 48 bits",
            what, value
        )));
    }
    Ok(value)
}

/// Current time in milliseconds since the Unix epoch, truncated to 48 bits
pub(crate) fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    millis & MAX_U48
}
