//! File-backed trees
//!
//! Trees opened from a data directory must come back with the same
//! document after close and reopen, and refuse to open over a damaged
//! page file or a manifest that disagrees with the store.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::TempDir;

use extree::container::PAGE_FILE_NAME;
use extree::tree::{TreeManifest, MANIFEST_FILE_NAME};
use extree::{Container, EXTree, EngineConfig, FileContainer, LoadEvent};

// =============================================================================
// Test Utilities
// =============================================================================

fn config() -> EngineConfig {
    EngineConfig::with_capacity(200)
}

fn build(dir: &Path) -> (String, usize) {
    let mut tree = EXTree::open_dir(dir, &config()).unwrap();
    tree.insert_markup("/", "inventory").unwrap();
    for i in 1..=25 {
        tree.insert_markup("/inventory", "part").unwrap();
        let at = format!("/inventory/part[{}]", i);
        tree.insert_attribute(&at, "sku", &format!("P-{:04}", i)).unwrap();
        tree.insert_literal(&at, &format!("part description {}", i))
            .unwrap();
    }
    tree.remove_markup("/inventory/part[4]").unwrap();

    let exported = tree.export_string(false).unwrap();
    let count = tree.node_count();
    tree.save_manifest(dir).unwrap();
    tree.close().unwrap();
    (exported, count)
}

fn flip_byte(path: &Path, offset: u64) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset as usize] ^= 0xFF;
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Reopen
// =============================================================================

#[test]
fn test_reopen_returns_same_document() {
    let dir = TempDir::new().unwrap();
    let (exported, count) = build(dir.path());

    let tree = EXTree::open_dir(dir.path(), &config()).unwrap();
    assert_eq!(tree.node_count(), count);
    assert_eq!(tree.export_string(false).unwrap(), exported);
    assert!(tree.check_consistency().unwrap().is_consistent());
    assert!(tree.container().size() > 1);
}

#[test]
fn test_reopen_then_modify() {
    let dir = TempDir::new().unwrap();
    let (_, count) = build(dir.path());

    let mut tree = EXTree::open_dir(dir.path(), &config()).unwrap();
    tree.insert_markup("/inventory", "part").unwrap();
    tree.remove_markup("/inventory/part[1]").unwrap();
    tree.save_manifest(dir.path()).unwrap();
    tree.close().unwrap();

    let tree = EXTree::open_dir(dir.path(), &config()).unwrap();
    assert_eq!(tree.node_count(), count + 1 - 3);
    assert!(tree.check_consistency().unwrap().is_consistent());
}

#[test]
fn test_fresh_directory_opens_empty() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("nested").join("tree");
    let tree = EXTree::open_dir(&data_dir, &config()).unwrap();
    assert!(tree.is_empty());
    assert!(data_dir.join(PAGE_FILE_NAME).exists());
    assert!(!data_dir.join(MANIFEST_FILE_NAME).exists());
}

#[test]
fn test_bulk_load_into_directory() {
    let dir = TempDir::new().unwrap();
    {
        let mut tree = EXTree::open_dir(dir.path(), &config()).unwrap();
        let mut events = vec![LoadEvent::start("feed")];
        for i in 0..40 {
            events.push(LoadEvent::start("entry"));
            events.push(LoadEvent::text(format!("entry {}", i)));
            events.push(LoadEvent::End);
        }
        events.push(LoadEvent::End);
        tree.bulk_load(events).unwrap();
        tree.save_manifest(dir.path()).unwrap();
        tree.close().unwrap();
    }

    let tree = EXTree::open_dir(dir.path(), &config()).unwrap();
    assert_eq!(tree.node_count(), 1 + 40 * 2);
    let found: Vec<_> = tree
        .query("/feed/entry[40]")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(found.len(), 1);
}

// =============================================================================
// Damage
// =============================================================================

#[test]
fn test_corrupt_page_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    build(dir.path());

    // first payload byte of the first entry
    flip_byte(&dir.path().join(PAGE_FILE_NAME), 17);

    let err = EXTree::<FileContainer>::open_dir(dir.path(), &config())
        .err()
        .expect("open should fail");
    assert!(err.is_fatal(), "{}", err);
}

#[test]
fn test_truncated_page_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    build(dir.path());

    let path = dir.path().join(PAGE_FILE_NAME);
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();

    let err = EXTree::<FileContainer>::open_dir(dir.path(), &config())
        .err()
        .expect("open should fail");
    assert!(err.is_fatal(), "{}", err);
}

#[test]
fn test_manifest_count_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    build(dir.path());

    let mut manifest = TreeManifest::load(dir.path()).unwrap().unwrap();
    manifest.node_count += 1;
    manifest.save(dir.path()).unwrap();

    let err = EXTree::<FileContainer>::open_dir(dir.path(), &config())
        .err()
        .expect("open should fail");
    assert_eq!(err.code(), "XTREE_INCONSISTENT");
}

#[test]
fn test_smaller_capacity_is_rejected() {
    let dir = TempDir::new().unwrap();
    build(dir.path());

    let err = EXTree::<FileContainer>::open_dir(dir.path(), &EngineConfig::with_capacity(128))
        .err()
        .expect("open should fail");
    assert_eq!(err.code(), "XTREE_CONFIG_ERROR");

    // a larger page still reads the old records
    let tree = EXTree::open_dir(dir.path(), &EngineConfig::with_capacity(4096)).unwrap();
    assert!(tree.check_consistency().unwrap().is_consistent());
}
