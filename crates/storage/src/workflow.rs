// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow state files (`workflows/<id>.json`).

use crate::snapshot::{load_json, save_json, SnapshotError};
use finger_core::{EpicId, SessionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Terminal and non-terminal workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// Summary of one Epic run, persisted so queries survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub epic_id: EpicId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub status: WorkflowStatus,
    pub round: u32,
    pub completed: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_at: u64,
}

/// File-backed workflow record store.
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn save(&self, record: &WorkflowRecord) -> Result<(), SnapshotError> {
        save_json(&self.path_for(&record.id), record)
    }

    pub fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, SnapshotError> {
        load_json(&self.path_for(id))
    }

    pub fn list(&self) -> Result<Vec<WorkflowRecord>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = load_json::<WorkflowRecord>(&path)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
