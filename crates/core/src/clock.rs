// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstractions.
//!
//! The daemon consumes wall-clock time through the [`Clock`] trait so tests
//! can inject a fake. [`SystemClock`] applies a correction offset supplied by
//! an external time-sync collaborator; [`MonotonicStamper`] guarantees that
//! successive timestamps never decrease even if the corrected wall clock
//! steps backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`, corrected by a fixed offset.
///
/// The offset is the signed millisecond correction reported by the external
/// time-sync supplier (0 when no correction is known).
#[derive(Clone, Copy, Default)]
pub struct SystemClock {
    offset_ms: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset_ms: i64) -> Self {
        Self { offset_ms }
    }
}

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        let raw = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        raw.saturating_add(self.offset_ms).max(0) as u64
    }
}

/// Manually-advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn at(ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wraps a [`Clock`] and never returns a smaller value than it last returned.
///
/// Shared by cloning; all clones observe the same floor.
#[derive(Clone)]
pub struct MonotonicStamper {
    clock: Arc<dyn Clock>,
    last: Arc<AtomicU64>,
}

impl MonotonicStamper {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            last: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the current time, clamped to be >= every previous return value.
    pub fn stamp(&self) -> u64 {
        let now = self.clock.epoch_ms();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

impl Default for MonotonicStamper {
    fn default() -> Self {
        Self::new(SystemClock::new())
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
