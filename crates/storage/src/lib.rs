// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! finger-storage: persistent state under the daemon home directory.
//!
//! Everything here follows the same durability recipe: serialize, write to a
//! temp file, fsync, atomic rename. Corrupt files rotate to `.bak` instead of
//! blocking startup.

pub mod checkpoint;
pub mod event_log;
pub mod session_store;
pub mod snapshot;
pub mod workflow;

pub use checkpoint::{CheckpointStore, OrchestrationCheckpoint, PhaseRecord};
pub use event_log::{EventLog, EventLogError};
pub use session_store::{SessionStore, SessionStoreError};
pub use snapshot::{load_json, save_json, SnapshotError, SnapshotWriter};
pub use workflow::{WorkflowRecord, WorkflowStatus, WorkflowStore};
