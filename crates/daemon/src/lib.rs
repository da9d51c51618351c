// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! finger-daemon: the long-lived orchestration server.
//!
//! Architecture:
//! - HTTP API on the primary port, WebSocket event stream on `wsPort`
//! - Message hub routing between hosted modules
//! - Background tasks: snapshot ticker, queue pump, supervisor checks

pub mod env;
pub mod event_bus;
pub mod http;
pub mod lifecycle;
pub mod mailbox;
pub mod modules;
pub mod tools;
pub mod ws;

pub use event_bus::{EventBus, SubscriptionFilter, SubscriptionId};
pub use lifecycle::{startup, Config, Daemon, LifecycleError, PRIMARY_TARGET};
pub use mailbox::{Completion, Mailbox};
pub use tools::ToolRunner;
