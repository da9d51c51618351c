// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use std::io::Write as _;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

fn doc(count: u32) -> Doc {
    Doc {
        name: "registry".to_string(),
        count,
    }
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    save_json(&path, &doc(42)).unwrap();
    let loaded: Doc = load_json(&path).unwrap().unwrap();
    assert_eq!(loaded, doc(42));
}

#[test]
fn load_nonexistent_is_none() {
    let dir = tempdir().unwrap();
    let result: Option<Doc> = load_json(&dir.path().join("missing.json")).unwrap();
    assert!(result.is_none());
}

#[test]
fn save_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    save_json(&path, &doc(1)).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn corrupt_file_rotates_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut f = File::create(&path).unwrap();
    f.write_all(b"\xe5\x03\x01binary-garbage").unwrap();
    drop(f);

    let result: Option<Doc> = load_json(&path).unwrap();
    assert!(result.is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn corrupt_loads_keep_at_most_three_backups() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    for i in 1..=4u8 {
        let mut f = File::create(&path).unwrap();
        f.write_all(&[i; 4]).unwrap();
        drop(f);
        let result: Option<Doc> = load_json(&path).unwrap();
        assert!(result.is_none());
    }

    assert_eq!(fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 4]);
    assert_eq!(fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 4]);
    assert!(!path.with_extension("bak.4").exists());
}

#[test]
fn writer_skips_unchanged_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let mut writer = SnapshotWriter::new(&path);

    assert!(writer.write_if_changed(&doc(1)).unwrap());
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();

    // Identical content: no write.
    assert!(!writer.write_if_changed(&doc(1)).unwrap());
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);

    // Changed content: written.
    assert!(writer.write_if_changed(&doc(2)).unwrap());
    let loaded: Doc = load_json(&path).unwrap().unwrap();
    assert_eq!(loaded.count, 2);
}

#[test]
fn writer_rewrites_after_new_instance() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut first = SnapshotWriter::new(&path);
    assert!(first.write_if_changed(&doc(1)).unwrap());

    // A fresh writer has no hash memory: first write always goes through.
    let mut second = SnapshotWriter::new(&path);
    assert!(second.write_if_changed(&doc(1)).unwrap());
}
