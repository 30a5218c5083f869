//! Store Module
//!
//! Immutable on-disk hash table, partitioned by key length.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (31 bytes)                                            │
//! │   MarkerLen: u16 = 9 | "VERSION_1" | Flags: u16              │
//! │   Timestamp: u48 | Values: u32 | Partitions: u32 | MaxKey: u32│
//! ├──────────────────────────────────────────────────────────────┤
//! │ Partition descriptors (28 bytes each, ascending key length)  │
//! │   KeySize | Keys | Slots | SlotSize | IndexOffset: u32       │
//! │   Reserved: u16 | DataOffset: u48                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Metadata: Len: u32 | opaque bytes                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Global offsets (12 bytes)                                    │
//! │   IndexStart: u32 | Reserved: u16 | DataStart: u48           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Index region: one slot array per partition                   │
//! │   slot = [key (KeySize)][varint offset, zero padded]         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data region: one value log per partition                     │
//! │   [0x00 reserved][varint len][value] ...                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integers are big-endian. Descriptor offsets are relative to the start of
//! their region; global offsets are relative to the first header byte.
//! Slot offsets are relative to the partition's value log, so offset 0 (the
//! reserved byte) always means "no value".

mod builder;
mod format;
mod index;
mod iterator;
mod log;
mod partition;
mod reader;
mod writer;

pub use builder::{Entry, IngestReport, StoreBuilder, StoreSummary};
pub use format::{GlobalOffsets, Header, PartitionDescriptor};
pub use index::BucketIndex;
pub use iterator::StoreIterator;
pub use log::{LogReplay, ValueLog};
pub use partition::{BuiltPartition, Partition, PartitionSet, Partitioner};
pub use reader::{Statistics, StoreReader};
pub use writer::{StoreWriter, WrittenStore};

// =============================================================================
// Shared Constants (used by builder, writer, reader)
// =============================================================================

/// Version marker; readers search for it to locate the header
pub(crate) const MARKER: &[u8; 9] = b"VERSION_1";

/// Marker without its version digit
pub(crate) const MARKER_PREFIX: &[u8] = b"VERSION_";

/// Header size: MarkerLen (2) + Marker (9) + Flags (2) + Timestamp (6)
/// + Values (4) + Partitions (4) + MaxKey (4) = 31 bytes
pub(crate) const HEADER_SIZE: usize = 31;

/// Descriptor size: 5 × u32 (20) + Reserved (2) + DataOffset (6) = 28 bytes
pub(crate) const DESCRIPTOR_SIZE: usize = 28;

/// Global offsets size: IndexStart (4) + Reserved (2) + DataStart (6) = 12 bytes
pub(crate) const OFFSETS_SIZE: usize = 12;

/// Metadata length prefix
pub(crate) const METADATA_LEN_SIZE: usize = 4;

/// Largest value of a 6-byte field
pub(crate) const MAX_U48: u64 = (1 << 48) - 1;

/// First byte of every value log, so that offset 0 never addresses a record
pub(crate) const RESERVED_LOG_BYTE: u8 = 0;
