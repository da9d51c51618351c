// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! finger-hub: content-based message routing between registered modules.
//!
//! The hub owns the module registry and the route table. `send` routes a
//! message by pattern, `send_to_module` bypasses routing for a direct
//! delivery, and `route_to_output` attaches a completion callback before the
//! handoff. Unroutable messages are queued and re-dispatched by
//! `process_queue`.

pub mod error_handler;
pub mod hub;
pub mod registry;

pub use error_handler::{ErrorHandler, ErrorHandlerConfig, ErrorReport};
pub use hub::{
    BlockingFailure, HandlerError, HubError, MessageHandler, MessageHub, PendingCallback,
    RegisterOptions, SendOutcome,
};
pub use registry::{
    EntryStatus, ModuleType, Pattern, PatternSpec, Registry, RegistryEntry, RegistrySnapshot,
    RouteId, RouteMatch, RouteRule, RouteSpec,
};
