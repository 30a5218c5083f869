//! Store component tests
//!
//! One binary for the store internals, split by component:
//! - varint packing
//! - bucket index placement and deletion
//! - value logs
//! - builder ingestion and publication
//! - reader lookups, scans and format validation
//! - compaction
//! - byte-exact file layout

mod compaction_tests;
mod format_tests;
mod index_tests;

use std::path::{Path, PathBuf};

use palkv::{Config, StoreBuilder, StoreReader};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.palkv");
    (temp_dir, path)
}

/// Config without compaction, so headers keep every ingested entry
pub fn uncompacted() -> Config {
    Config::builder().compaction_threshold(0.0).build()
}

/// Build a store with `count` numbered entries
pub fn build_store_with_entries(path: &Path, count: usize) -> StoreReader {
    let mut builder = StoreBuilder::new(path, Config::default()).unwrap();
    for i in 0..count {
        let key = format!("key{:05}", i);
        let value = format!("value{}", i);
        builder.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
    StoreReader::open(path).unwrap()
}

/// Names of the files left in `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
