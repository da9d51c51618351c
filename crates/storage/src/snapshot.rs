// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! The registry snapshot is a single JSON document at a fixed path. Writes
//! are atomic (temp file + fsync + rename) and idempotent: [`SnapshotWriter`]
//! hashes the serialized content and skips the write when nothing changed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Save a value atomically (write to .tmp, fsync, then rename).
///
/// A crash during save cannot corrupt the existing file.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a value if the file exists.
///
/// Returns `Ok(None)` if the file doesn't exist or is corrupt. Corrupt files
/// are moved to a `.bak` file so the daemon can start empty.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let stashed = stash_corrupt(path)?;
            warn!(
                error = %e,
                path = %path.display(),
                stashed = %stashed.display(),
                "Corrupt state file, stashed and starting fresh",
            );
            Ok(None)
        }
    }
}

/// Corrupt-file backups retained per path: `.bak`, `.bak.2`, `.bak.3`.
const BAK_SLOTS: u32 = 3;

/// Move an unreadable file out of the way as `.bak`, returning where it went.
///
/// Earlier backups each slide one slot down; whatever sat in the last slot
/// is overwritten by the slide.
fn stash_corrupt(path: &Path) -> Result<PathBuf, SnapshotError> {
    let slot = |n: u32| match n {
        1 => path.with_extension("bak"),
        n => path.with_extension(format!("bak.{n}")),
    };

    for n in (2..=BAK_SLOTS).rev() {
        // Rename over the next slot; a missing source is fine.
        let _ = fs::rename(slot(n - 1), slot(n));
    }

    let dest = slot(1);
    fs::rename(path, &dest)?;
    Ok(dest)
}

/// Idempotent snapshot writer.
///
/// Remembers the content hash of the last successful write and skips the
/// disk write when the serialized document is unchanged.
pub struct SnapshotWriter {
    path: PathBuf,
    last_hash: Option<[u8; 32]>,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_hash: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize, hash, and write iff the hash differs from the previous
    /// successful write. Returns whether a write happened.
    pub fn write_if_changed<T: Serialize>(&mut self, value: &T) -> Result<bool, SnapshotError> {
        let bytes = serde_json::to_vec(value)?;
        let hash: [u8; 32] = Sha256::digest(&bytes).into();

        if self.last_hash == Some(hash) {
            return Ok(false);
        }

        write_atomic(&self.path, &bytes)?;
        self.last_hash = Some(hash);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
