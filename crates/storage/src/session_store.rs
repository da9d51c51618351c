// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project session persistence.
//!
//! Layout under the store root:
//!
//! ```text
//! session/<project-dir>/<session-id>/main.json          root session
//! session/<project-dir>/<session-id>/agent-<owner>.json runtime sub-session
//! ```
//!
//! `<project-dir>` is the project path canonicalized to forward slashes with
//! reserved characters encoded as `_`. Sessions autosave on every mutation;
//! the file on disk is the source of truth, and the in-memory cache holds the
//! last successfully written state.

use crate::snapshot::{load_json, save_json, SnapshotError};
use finger_core::{
    CompressedHistory, Minter, ModuleId, Role, Session, SessionId, SessionMessage,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Messages kept verbatim when compressing context.
const COMPRESS_KEEP: usize = 50;

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error(transparent)]
    Persist(#[from] SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a project path as a single directory name: forward slashes, with
/// reserved characters replaced by `_`.
pub fn project_dir_name(project_path: &str) -> String {
    let normalized = project_path.replace('\\', "/");
    normalized
        .chars()
        .map(|c| match c {
            '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Extractive default summary: up to 100 chars from each user message, plus
/// counts of assistant messages and unique task ids.
fn default_summary(messages: &[SessionMessage]) -> String {
    let mut lines = Vec::new();
    let mut assistant_count = 0usize;
    let mut task_ids: Vec<&str> = Vec::new();

    for message in messages {
        match message.role {
            Role::User => {
                let mut excerpt: String = message.content.chars().take(100).collect();
                if message.content.chars().count() > 100 {
                    excerpt.push('…');
                }
                lines.push(format!("user: {excerpt}"));
            }
            Role::Assistant => assistant_count += 1,
            _ => {}
        }
        if let Some(task_id) = message.task_id.as_deref() {
            if !task_ids.contains(&task_id) {
                task_ids.push(task_id);
            }
        }
    }

    lines.push(format!("{assistant_count} assistant messages"));
    if !task_ids.is_empty() {
        lines.push(format!("tasks: {}", task_ids.join(", ")));
    }
    lines.join("\n")
}

/// File-backed session manager.
pub struct SessionStore {
    root: PathBuf,
    minter: Minter,
    cache: Mutex<HashMap<SessionId, Session>>,
    /// Serializes read-modify-write mutations so concurrent writers to one
    /// session cannot interleave between the cache read and the disk write.
    write_gate: Mutex<()>,
}

impl SessionStore {
    /// Open a store rooted at `root` (the `session/` directory), loading all
    /// persisted sessions into the cache.
    pub fn open(root: impl Into<PathBuf>, minter: Minter) -> Result<Self, SessionStoreError> {
        let store = Self {
            root: root.into(),
            minter,
            cache: Mutex::new(HashMap::new()),
            write_gate: Mutex::new(()),
        };
        store.load_all()?;
        Ok(store)
    }

    fn load_all(&self) -> Result<(), SessionStoreError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
            return Ok(());
        }

        let mut cache = self.cache.lock();
        for project in read_dirs(&self.root)? {
            for session_dir in read_dirs(&project)? {
                for file in read_files(&session_dir)? {
                    if file.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match load_json::<Session>(&file)? {
                        Some(session) => {
                            cache.insert(session.id.clone(), session);
                        }
                        None => {
                            tracing::warn!(path = %file.display(), "skipping unreadable session file");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Disk location for a session file.
    fn session_path(&self, session: &Session) -> PathBuf {
        let project = project_dir_name(&session.project_path);
        // Runtime sub-sessions live in their root session's directory.
        let dir_id = session
            .context
            .root_session_id
            .as_ref()
            .or(session.context.parent_session_id.as_ref())
            .unwrap_or(&session.id);
        let dir = self.root.join(project).join(dir_id.as_str());
        match &session.context.owner_agent_id {
            Some(owner) if session.is_runtime() => dir.join(format!("agent-{owner}.json")),
            _ => dir.join("main.json"),
        }
    }

    /// Persist and commit to cache. The cache only observes states that
    /// reached disk.
    fn commit(&self, session: Session) -> Result<Session, SessionStoreError> {
        save_json(&self.session_path(&session), &session)?;
        self.cache
            .lock()
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Create a session for a project. With `allow_reuse`, an existing empty
    /// root session for the same project is returned instead of a new one.
    pub fn create_session(
        &self,
        project_path: &str,
        name: Option<&str>,
        allow_reuse: bool,
    ) -> Result<Session, SessionStoreError> {
        let _gate = self.write_gate.lock();
        if allow_reuse {
            let reusable = {
                let cache = self.cache.lock();
                cache
                    .values()
                    .filter(|s| {
                        s.project_path == project_path && s.messages.is_empty() && !s.is_runtime()
                    })
                    .min_by_key(|s| s.created_at)
                    .cloned()
            };
            if let Some(mut session) = reusable {
                session.last_accessed_at = self.minter.now_ms();
                if let Some(name) = name {
                    session.name = name.to_string();
                }
                return self.commit(session);
            }
        }

        let id = SessionId::new(self.minter.mint_random("session"));
        let now = self.minter.now_ms();
        let name = name.map(str::to_string).unwrap_or_else(|| id.to_string());
        let mut session = Session::new(id, name, project_path, now);
        session.context.session_tier = Some("root".to_string());
        self.commit(session)
    }

    /// Create-if-missing with a caller-supplied id.
    pub fn ensure_session(
        &self,
        id: &SessionId,
        project_path: &str,
        name: Option<&str>,
    ) -> Result<Session, SessionStoreError> {
        let _gate = self.write_gate.lock();
        if let Some(existing) = self.get_session(id) {
            return Ok(existing);
        }
        let now = self.minter.now_ms();
        let name = name.map(str::to_string).unwrap_or_else(|| id.to_string());
        let mut session = Session::new(id.clone(), name, project_path, now);
        session.context.session_tier = Some("root".to_string());
        self.commit(session)
    }

    /// Create a runtime sub-session under a root session, owned by one agent.
    pub fn create_runtime_session(
        &self,
        root_id: &SessionId,
        owner: &ModuleId,
    ) -> Result<Session, SessionStoreError> {
        let _gate = self.write_gate.lock();
        let root = self.require(root_id)?;
        let id = SessionId::new(self.minter.mint_random("session"));
        let now = self.minter.now_ms();
        let mut session = Session::new(
            id,
            format!("agent-{owner}"),
            root.project_path.clone(),
            now,
        );
        session.context.session_tier = Some("runtime".to_string());
        session.context.parent_session_id = Some(root_id.clone());
        session.context.root_session_id = Some(root_id.clone());
        session.context.owner_agent_id = Some(owner.clone());
        self.commit(session)
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.cache.lock().get(id).cloned()
    }

    /// Stamp `last_accessed_at` and persist. Used by the API layer when a
    /// client opens a session.
    pub fn touch_session(&self, id: &SessionId) -> Result<Session, SessionStoreError> {
        let _gate = self.write_gate.lock();
        let mut session = self.require(id)?;
        session.last_accessed_at = self.minter.now_ms();
        self.commit(session)
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.cache.lock().values().cloned().collect()
    }

    fn require(&self, id: &SessionId) -> Result<Session, SessionStoreError> {
        self.cache
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionStoreError::NotFound(id.clone()))
    }

    /// Append a message and autosave.
    pub fn add_message(
        &self,
        id: &SessionId,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<SessionMessage, SessionStoreError> {
        let _gate = self.write_gate.lock();
        let mut session = self.require(id)?;
        let mut message = SessionMessage::new(
            self.minter.mint("msg"),
            role,
            content,
            self.minter.now_ms(),
        );
        message.metadata = metadata;
        session.push_message(message.clone());
        session.updated_at = session.updated_at.max(self.minter.now_ms());
        let saved = self.commit(session)?;
        // push_message may have clamped the timestamp; report what was stored.
        Ok(saved
            .messages
            .last()
            .cloned()
            .unwrap_or(message))
    }

    /// Tail-limited message read.
    pub fn get_messages(&self, id: &SessionId, limit: usize) -> Vec<SessionMessage> {
        match self.get_session(id) {
            Some(session) => {
                let skip = session.messages.len().saturating_sub(limit);
                session.messages[skip..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Rewrite a message in place. Empty content is rejected.
    pub fn update_message(
        &self,
        id: &SessionId,
        message_id: &str,
        content: &str,
    ) -> Result<(), SessionStoreError> {
        let _gate = self.write_gate.lock();
        if content.trim().is_empty() {
            return Err(SessionStoreError::InvalidState(
                "message content cannot be empty".to_string(),
            ));
        }
        let mut session = self.require(id)?;
        let message = session
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| SessionStoreError::MessageNotFound(message_id.to_string()))?;
        message.content = content.to_string();
        session.updated_at = self.minter.now_ms();
        self.commit(session)?;
        Ok(())
    }

    pub fn delete_message(
        &self,
        id: &SessionId,
        message_id: &str,
    ) -> Result<(), SessionStoreError> {
        let _gate = self.write_gate.lock();
        let mut session = self.require(id)?;
        let before = session.messages.len();
        session.messages.retain(|m| m.id != message_id);
        if session.messages.len() == before {
            return Err(SessionStoreError::MessageNotFound(message_id.to_string()));
        }
        session.updated_at = self.minter.now_ms();
        self.commit(session)?;
        Ok(())
    }

    /// Compress old context: when the log exceeds [`COMPRESS_KEEP`] messages,
    /// all but the newest are folded into a summary. Returns whether
    /// compression ran.
    pub fn compress_context(
        &self,
        id: &SessionId,
        summarizer: Option<&dyn Fn(&[SessionMessage]) -> String>,
    ) -> Result<bool, SessionStoreError> {
        let _gate = self.write_gate.lock();
        let mut session = self.require(id)?;
        if session.messages.len() <= COMPRESS_KEEP {
            return Ok(false);
        }

        let split = session.messages.len() - COMPRESS_KEEP;
        let old: Vec<SessionMessage> = session.messages.drain(..split).collect();
        let summary = match summarizer {
            Some(f) => f(&old),
            None => default_summary(&old),
        };

        let previous_count = session
            .context
            .compressed_history
            .as_ref()
            .map(|h| h.message_count)
            .unwrap_or(0);
        let previous_summary = session
            .context
            .compressed_history
            .as_ref()
            .map(|h| h.summary.clone());

        let merged = match previous_summary {
            Some(prev) => format!("{prev}\n{summary}"),
            None => summary,
        };
        session.context.compressed_history = Some(CompressedHistory {
            summary: merged,
            message_count: previous_count + old.len(),
            compressed_at: self.minter.now_ms(),
        });
        session.updated_at = self.minter.now_ms();
        self.commit(session)?;
        Ok(true)
    }

    pub fn pause_session(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        self.set_paused(id, true)
    }

    pub fn resume_session(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        self.set_paused(id, false)
    }

    fn set_paused(&self, id: &SessionId, paused: bool) -> Result<(), SessionStoreError> {
        let _gate = self.write_gate.lock();
        let mut session = self.require(id)?;
        session.context.paused = paused;
        session.updated_at = self.minter.now_ms();
        self.commit(session)?;
        Ok(())
    }

    /// Remove a session from disk and cache.
    pub fn delete_session(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        let _gate = self.write_gate.lock();
        let session = self.require(id)?;
        let path = self.session_path(&session);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        // Remove the session directory when this was its last file.
        if let Some(dir) = path.parent() {
            if dir.exists() && read_files(dir)?.is_empty() {
                let _ = fs::remove_dir(dir);
            }
        }
        self.cache.lock().remove(id);
        Ok(())
    }
}

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>, SessionStoreError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn read_files(path: &Path) -> Result<Vec<PathBuf>, SessionStoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
