// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! finger-adapters: bridges between the daemon and external processes.
//!
//! The main adapter is the gateway session, which runs an LLM-CLI wrapper as
//! a child process and speaks the JSONL request/ack/result protocol over its
//! stdio.

pub mod gateway;

pub use gateway::{
    GatewayAdapter, GatewayConfig, GatewayError, GatewayReply, ProcessGateway,
};

#[cfg(any(test, feature = "test-support"))]
pub use gateway::fake::{FakeGateway, GatewayCall};
