//! Store Builder
//!
//! Ingestion front end. Entries are routed into per-key-length partitions
//! staged in a temporary directory; `finish` builds the indexes, writes the
//! store, compacts it when too many entries were shadowed, and publishes it
//! with a single rename.
//!
//! ```text
//!   add / delete / extend
//!          │
//!          ▼
//!   ┌─────────────┐   build    ┌─────────────┐   write   ┌──────────────────┐
//!   │ Partitioner │──────────▶│ PartitionSet│─────────▶│ staging/__all__  │
//!   └─────────────┘  (scoped)  └─────────────┘           └────────┬─────────┘
//!                                                                 │ ratio < threshold?
//!                                               ┌─────────────────┴───────┐
//!                                               ▼ no                      ▼ yes
//!                                        rename → path       scan → nested builder
//!                                                             → rename → path
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;

use super::partition::Partitioner;
use super::reader::StoreReader;
use super::writer::{StoreWriter, WrittenStore};

/// Name of the store written before the compaction decision
const STAGED_STORE: &str = "__all__";

/// Name of the rebuilt store when compaction runs
const COMPACTED_STORE: &str = "__compacted__";

/// A key and its value, or a tombstone (`value == None`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Entry {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Outcome of `StoreBuilder::extend`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: u64,
    /// Entries skipped as invalid (logged at warn level)
    pub rejected: u64,
}

/// Description of a published store
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub path: PathBuf,
    /// Live keys
    pub num_keys: u64,
    /// Entries recorded in the header (tombstones included unless compacted)
    pub num_values: u64,
    pub num_partitions: u64,
    pub file_size: u64,
    /// Whether the published file is the compacted rebuild
    pub compacted: bool,
}

/// Single-writer builder for one store file
pub struct StoreBuilder {
    config: Config,
    /// Destination path, only touched by the final rename
    path: PathBuf,
    /// Removed on drop, whether or not `finish` succeeds
    staging: TempDir,
    partitioner: Partitioner,
}

impl StoreBuilder {
    /// Start a build that will publish to `path`.
    ///
    /// The config is validated before anything touches the filesystem.
    pub fn new(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let staging_root = match &config.staging_dir {
            Some(dir) => dir.clone(),
            None => match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        let staging = tempfile::Builder::new()
            .prefix(".palkv-")
            .tempdir_in(&staging_root)?;

        debug!(
            path = %path.display(),
            staging = %staging.path().display(),
            "Started store build"
        );

        let partitioner = Partitioner::new(staging.path());
        Ok(Self {
            config,
            path,
            staging,
            partitioner,
        })
    }

    /// Add a key-value pair
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.partitioner.add_entry(key, Some(value))
    }

    /// Delete `key`: drops any value added before, and is a no-op otherwise
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.partitioner.add_entry(key, None)
    }

    pub fn add_entry(&mut self, entry: Entry) -> Result<()> {
        self.partitioner.add_entry(&entry.key, entry.value.as_deref())
    }

    /// Ingest entries until the iterator ends.
    ///
    /// Invalid entries are logged and skipped; any other error stops the
    /// ingestion and is returned.
    pub fn extend<I>(&mut self, entries: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut report = IngestReport::default();
        for entry in entries {
            match self.add_entry(entry) {
                Ok(()) => report.accepted += 1,
                Err(e) if !e.is_fatal() => {
                    warn!(error = %e, "Skipping entry");
                    report.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Entries recorded so far, tombstones included
    pub fn num_values(&self) -> u64 {
        self.partitioner.num_values()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build, write, compact if needed and publish the store.
    ///
    /// On error the staging directory is removed and the destination is left
    /// untouched.
    pub fn finish(self) -> Result<StoreSummary> {
        let Self {
            config,
            path,
            staging,
            partitioner,
        } = self;

        let mut set = partitioner.build(
            config.load_factor,
            config.no_distinct,
            config.parallel_build,
        )?;

        let staged = staging.path().join(STAGED_STORE);
        let written = StoreWriter::create(&staged)?.write(&mut set, &config.metadata)?;
        let num_keys = set.num_keys;
        // Value logs are no longer needed once copied into the store.
        drop(set);

        let summary = if needs_compaction(num_keys, &written, &config) {
            info!(
                keys = num_keys,
                values = written.header.num_values,
                threshold = config.compaction_threshold,
                "Compacting store"
            );
            let rebuilt = compact(&staged, staging.path(), &config)?;
            fs::rename(&rebuilt.path, &path)?;
            StoreSummary {
                path,
                compacted: true,
                ..rebuilt
            }
        } else {
            fs::rename(&staged, &path)?;
            StoreSummary {
                path,
                num_keys,
                num_values: written.header.num_values as u64,
                num_partitions: written.header.num_partitions as u64,
                file_size: written.file_size,
                compacted: false,
            }
        };
        staging.close()?;

        info!(
            path = %summary.path.display(),
            keys = summary.num_keys,
            values = summary.num_values,
            partitions = summary.num_partitions,
            bytes = summary.file_size,
            compacted = summary.compacted,
            "Published store"
        );

        Ok(summary)
    }
}

/// `live keys / values < threshold`; an empty store is always compact
fn needs_compaction(num_keys: u64, written: &WrittenStore, config: &Config) -> bool {
    let num_values = written.header.num_values as u64;
    if num_values == 0 {
        return false;
    }
    (num_keys as f64 / num_values as f64) < config.compaction_threshold
}

/// Rebuild `staged` from its own scan, keeping only live entries.
///
/// The rebuild is staged inside `staging_dir` and its intermediate input is
/// removed once the scan has been consumed.
fn compact(staged: &Path, staging_dir: &Path, config: &Config) -> Result<StoreSummary> {
    let nested_config = Config {
        compaction_threshold: 0.0,
        staging_dir: Some(staging_dir.to_path_buf()),
        ..config.clone()
    };
    let mut builder = StoreBuilder::new(staging_dir.join(COMPACTED_STORE), nested_config)?;

    {
        let reader = StoreReader::open(staged)?;
        for item in reader.iter() {
            let (key, value) = item?;
            builder.add(key, value)?;
        }
    }
    fs::remove_file(staged)?;

    builder.finish()
}
