// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event persistence.
//!
//! One JSON line per event, appended to a per-day file under the logs
//! directory. Files roll over when they exceed [`MAX_FILE_SIZE`]; only the
//! newest [`MAX_FILES`] files are kept.

use chrono::Utc;
use finger_core::Event;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum file size before rollover (10 MB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Number of log files to keep.
const MAX_FILES: usize = 30;

/// Errors that can occur appending events
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

struct OpenFile {
    path: PathBuf,
    file: File,
    size: u64,
}

/// Append-only JSONL event log with daily files and size rollover.
pub struct EventLog {
    dir: PathBuf,
    current: Mutex<Option<OpenFile>>,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one event as a single JSON line.
    pub fn append(&self, event: &Event) -> Result<(), EventLogError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut current = self.current.lock();
        let target = self.target_path(current.as_ref())?;

        let needs_open = match current.as_ref() {
            Some(open) => open.path != target,
            None => true,
        };
        if needs_open {
            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new().create(true).append(true).open(&target)?;
            let size = file.metadata()?.len();
            *current = Some(OpenFile {
                path: target,
                file,
                size,
            });
            drop(current);
            self.prune()?;
            current = self.current.lock();
        }

        if let Some(open) = current.as_mut() {
            open.file.write_all(&line)?;
            open.size += line.len() as u64;
        }
        Ok(())
    }

    /// Resolve the file today's events go to, rolling over on size.
    fn target_path(&self, current: Option<&OpenFile>) -> Result<PathBuf, EventLogError> {
        let day = Utc::now().format("%Y-%m-%d").to_string();

        if let Some(open) = current {
            let is_today = open
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&format!("events-{day}")));
            if is_today {
                if open.size < MAX_FILE_SIZE {
                    return Ok(open.path.clone());
                }
                // Rolled over by size: next free suffix for today.
                let mut n = 1u32;
                loop {
                    let candidate = self.dir.join(format!("events-{day}.{n}.jsonl"));
                    if !candidate.exists() && candidate != open.path {
                        return Ok(candidate);
                    }
                    n += 1;
                }
            }
        }

        Ok(self.dir.join(format!("events-{day}.jsonl")))
    }

    /// Delete the oldest files beyond the retention limit. Lexicographic
    /// order matches chronological order for `events-YYYY-MM-DD` names.
    fn prune(&self) -> Result<(), EventLogError> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("events-") && n.ends_with(".jsonl"))
            })
            .collect();
        if files.len() <= MAX_FILES {
            return Ok(());
        }
        files.sort();
        let excess = files.len() - MAX_FILES;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to prune event log");
            }
        }
        Ok(())
    }
}

/// Read every event from one log file, skipping corrupt lines.
pub fn read_events(path: &Path) -> Result<Vec<Event>, EventLogError> {
    let content = fs::read_to_string(path)?;
    let mut events = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt event line");
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
