//! Tests for compaction
//!
//! A freshly built store is rebuilt from its own scan when live keys make
//! up less than `compaction_threshold` of the ingested entries.

use palkv::{Config, StoreBuilder, StoreReader};

use super::{dir_entries, setup_temp_store, uncompacted};

fn with_threshold(threshold: f64) -> Config {
    Config::builder().compaction_threshold(threshold).build()
}

#[test]
fn test_write_then_delete_without_compaction() {
    let (_temp, path) = setup_temp_store();
    let mut builder = StoreBuilder::new(&path, uncompacted()).unwrap();
    builder.add(b"key", b"value").unwrap();
    builder.delete(b"key").unwrap();
    let summary = builder.finish().unwrap();

    assert!(!summary.compacted);
    assert_eq!(summary.num_keys, 0);
    assert_eq!(summary.num_values, 2);

    let reader = StoreReader::open(&path).unwrap();
    assert_eq!(reader.statistics().num_values, 2);
    assert_eq!(reader.statistics().num_partitions, 1);
    assert_eq!(reader.get(b"key").unwrap(), None);
}

#[test]
fn test_write_then_delete_compacts_to_empty() {
    let (_temp, path) = setup_temp_store();
    let mut builder = StoreBuilder::new(&path, Config::default()).unwrap();
    builder.add(b"key", b"value").unwrap();
    builder.delete(b"key").unwrap();
    let summary = builder.finish().unwrap();

    assert!(summary.compacted);
    assert_eq!(summary.num_keys, 0);
    assert_eq!(summary.num_values, 0);
    assert_eq!(summary.num_partitions, 0);

    let reader = StoreReader::open(&path).unwrap();
    assert_eq!(reader.statistics().num_values, 0);
    assert_eq!(reader.get(b"key").unwrap(), None);
    assert_eq!(reader.iter().count(), 0);
}

#[test]
fn test_compaction_keeps_live_entries() {
    let (temp, path) = setup_temp_store();
    let writes = 100;
    let deletes = 60;

    let mut builder = StoreBuilder::new(&path, Config::default()).unwrap();
    for i in 0..writes {
        builder.add(format!("key{:03}", i).as_bytes(), format!("v{}", i).as_bytes()).unwrap();
    }
    for i in 0..deletes {
        builder.delete(format!("key{:03}", i).as_bytes()).unwrap();
    }
    let summary = builder.finish().unwrap();

    // 40 live / 160 entries is below the default 0.7
    assert!(summary.compacted);
    assert_eq!(summary.num_keys, writes - deletes);
    assert_eq!(summary.num_values, writes - deletes);

    let reader = StoreReader::open(&path).unwrap();
    assert_eq!(reader.statistics().num_values, writes - deletes);
    for i in 0..writes {
        let expected = (i >= deletes).then(|| format!("v{}", i).into_bytes());
        let found = reader.get(format!("key{:03}", i).as_bytes()).unwrap().map(<[u8]>::to_vec);
        assert_eq!(found, expected, "key{:03}", i);
    }

    // Intermediate files are gone
    assert_eq!(dir_entries(temp.path()), vec!["test.palkv".to_string()]);
}

#[test]
fn test_compaction_preserves_scan_and_metadata() {
    let (_temp, path) = setup_temp_store();
    let compacted_path = path.with_extension("compacted");

    for (target, threshold) in [(&path, 0.0), (&compacted_path, 1.0)] {
        let config = Config::builder()
            .compaction_threshold(threshold)
            .metadata("schema-v1")
            .build();
        let mut builder = StoreBuilder::new(target, config).unwrap();
        builder.add(b"a", b"1").unwrap();
        builder.add(b"bb", b"2").unwrap();
        builder.add(b"cc", b"3").unwrap();
        builder.delete(b"bb").unwrap();
        builder.add(b"ddd", b"4").unwrap();
        builder.finish().unwrap();
    }

    let plain = StoreReader::open(&path).unwrap();
    let compacted = StoreReader::open(&compacted_path).unwrap();

    assert_eq!(plain.statistics().num_values, 5);
    assert_eq!(compacted.statistics().num_values, 3);
    assert_eq!(compacted.metadata(), b"schema-v1");

    let plain_entries: Vec<_> = plain.iter().map(|e| e.unwrap()).collect();
    let compacted_entries: Vec<_> = compacted.iter().map(|e| e.unwrap()).collect();
    assert_eq!(plain_entries, compacted_entries);
    assert_eq!(
        compacted_entries,
        vec![(&b"a"[..], &b"1"[..]), (&b"cc"[..], &b"3"[..]), (&b"ddd"[..], &b"4"[..])]
    );
}

#[test]
fn test_compaction_threshold_boundary() {
    let (_temp, path) = setup_temp_store();
    let mut builder = StoreBuilder::new(&path, with_threshold(0.5)).unwrap();
    builder.add(b"x", b"1").unwrap();
    builder.add(b"y", b"2").unwrap();
    builder.delete(b"x").unwrap();
    builder.delete(b"z").unwrap();
    let summary = builder.finish().unwrap();

    // 1 live / 4 entries
    assert!(summary.compacted);

    let (_temp, path) = setup_temp_store();
    let mut builder = StoreBuilder::new(&path, with_threshold(0.5)).unwrap();
    builder.add(b"x", b"1").unwrap();
    builder.delete(b"x").unwrap();
    builder.add(b"y", b"2").unwrap();
    builder.add(b"w", b"3").unwrap();
    let summary = builder.finish().unwrap();

    // 2 live / 4 entries
    assert!(!summary.compacted);
    assert_eq!(summary.num_values, 4);
}

#[test]
fn test_tombstone_only_partition_dropped_by_compaction() {
    let (_temp, path) = setup_temp_store();
    let mut builder = StoreBuilder::new(&path, with_threshold(0.9)).unwrap();
    builder.add(b"short", b"1").unwrap();
    builder.add(b"longer key", b"2").unwrap();
    builder.delete(b"longer key").unwrap();
    let summary = builder.finish().unwrap();

    assert!(summary.compacted);
    assert_eq!(summary.num_partitions, 1);

    let reader = StoreReader::open(&path).unwrap();
    assert_eq!(reader.max_key_size(), 5);
    assert_eq!(reader.get(b"short").unwrap(), Some(&b"1"[..]));
}
