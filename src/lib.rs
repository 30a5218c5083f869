//! # palkv
//!
//! An embedded, write-once, read-optimized key-value store:
//! - Build a store once from a stream of puts and deletes
//! - Open it read-only through a memory map
//! - Constant average-time lookups and lazy full scans
//!
//! ## Architecture Overview
//!
//! ```text
//!   entries (key, value | tombstone)
//!                 │
//! ┌───────────────▼─────────────────────────────────────────────┐
//! │                      StoreBuilder                           │
//! │        (staging dir, compaction, atomic rename)             │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │ route by key length
//!        ┌────────┴─────────┬──────────────────┐
//!        ▼                  ▼                  ▼
//!  ┌───────────┐      ┌───────────┐      ┌───────────┐
//!  │ Partition │      │ Partition │      │ Partition │
//!  │  log+index│      │  log+index│      │  log+index│
//!  └─────┬─────┘      └─────┬─────┘      └─────┬─────┘
//!        └──────────────────┼──────────────────┘
//!                           ▼
//!                  ┌─────────────────┐
//!                  │   StoreWriter   │ ──▶ store file
//!                  └─────────────────┘
//!                                              │ mmap
//!                                     ┌────────▼────────┐
//!                                     │   StoreReader   │
//!                                     │  get / iter     │
//!                                     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use palkv::{Config, StoreBuilder, StoreReader};
//! use std::path::Path;
//!
//! # fn main() -> palkv::Result<()> {
//! let mut builder = StoreBuilder::new("words.palkv", Config::default())?;
//! builder.add(b"one", b"1")?;
//! builder.add(b"two", b"2")?;
//! builder.delete(b"one")?;
//! builder.finish()?;
//!
//! let reader = StoreReader::open(Path::new("words.palkv"))?;
//! assert_eq!(reader.get(b"two")?, Some(&b"2"[..]));
//! assert_eq!(reader.get(b"one")?, None);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod varint;
pub mod hash;
pub mod store;
pub mod codec;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PalError, Result};
pub use config::Config;
pub use store::{Entry, IngestReport, Statistics, StoreBuilder, StoreIterator, StoreReader, StoreSummary};
pub use codec::{BincodeCodec, Codec, RawCodec, TypedBuilder, TypedReader, Utf8Codec};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of palkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
