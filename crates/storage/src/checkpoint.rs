// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration checkpoints.
//!
//! A checkpoint is the full loop state of one Epic run plus its phase
//! history, written to `session-states/<sessionId>-<checkpointId>.json`.
//! Resume picks the newest checkpoint for a session by `saved_at`.

use crate::snapshot::{load_json, save_json, SnapshotError};
use finger_core::{LoopState, Phase, SessionId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One phase the run passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub phase: Phase,
    pub entered_at: u64,
}

/// Persisted orchestration state for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationCheckpoint {
    pub session_id: SessionId,
    pub checkpoint_id: String,
    pub state: LoopState,
    #[serde(default)]
    pub phase_history: Vec<PhaseRecord>,
    pub saved_at: u64,
}

/// File-backed checkpoint store.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &SessionId, checkpoint_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", session_id, checkpoint_id))
    }

    pub fn save(&self, checkpoint: &OrchestrationCheckpoint) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(&checkpoint.session_id, &checkpoint.checkpoint_id);
        save_json(&path, checkpoint)?;
        Ok(path)
    }

    pub fn load(
        &self,
        session_id: &SessionId,
        checkpoint_id: &str,
    ) -> Result<Option<OrchestrationCheckpoint>, SnapshotError> {
        load_json(&self.path_for(session_id, checkpoint_id))
    }

    /// All checkpoints for a session, oldest first.
    pub fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<OrchestrationCheckpoint>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}-", session_id);
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            if let Some(checkpoint) = load_json::<OrchestrationCheckpoint>(&path)? {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by_key(|c| c.saved_at);
        Ok(checkpoints)
    }

    /// Newest checkpoint for a session, for resume after a crash.
    pub fn latest_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<OrchestrationCheckpoint>, SnapshotError> {
        Ok(self.list_for_session(session_id)?.pop())
    }

    /// Delete all checkpoints for a session (run finished cleanly).
    pub fn clear_session(&self, session_id: &SessionId) -> Result<usize, SnapshotError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let prefix = format!("{}-", session_id);
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
