// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{ModuleType, RegistryEntry};

fn registry_with(id: &str) -> Arc<RwLock<Registry>> {
    let mut registry = Registry::new();
    registry.upsert_entry(RegistryEntry::new(
        ModuleId::new(id),
        ModuleType::Output,
        "echo",
        0,
    ));
    Arc::new(RwLock::new(registry))
}

#[tokio::test]
async fn failures_below_threshold_do_not_pause() {
    let registry = registry_with("m");
    let handler = ErrorHandler::new(ErrorHandlerConfig {
        pause_after: 3,
        retry_delay_ms: 10,
    });
    let module = ModuleId::new("m");

    for _ in 0..2 {
        let report = handler.report(&registry, &module, "boom");
        assert!(!report.paused);
        assert!(!report.retry_scheduled);
    }
    assert_eq!(registry.read().entry(&module).unwrap().status, EntryStatus::Active);
    assert_eq!(handler.failure_count(&module), 2);
}

#[tokio::test]
async fn threshold_pauses_and_schedules_resume() {
    let registry = registry_with("m");
    let handler = ErrorHandler::new(ErrorHandlerConfig {
        pause_after: 2,
        retry_delay_ms: 20,
    });
    let module = ModuleId::new("m");

    handler.report(&registry, &module, "boom");
    let report = handler.report(&registry, &module, "boom");
    assert!(report.paused);
    assert!(report.retry_scheduled);
    assert_eq!(registry.read().entry(&module).unwrap().status, EntryStatus::Paused);

    // Resume fires after the delay and clears the streak.
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    assert_eq!(registry.read().entry(&module).unwrap().status, EntryStatus::Active);
    assert_eq!(handler.failure_count(&module), 0);
}

#[tokio::test]
async fn reset_clears_the_streak() {
    let registry = registry_with("m");
    let handler = ErrorHandler::new(ErrorHandlerConfig {
        pause_after: 3,
        retry_delay_ms: 10,
    });
    let module = ModuleId::new("m");

    handler.report(&registry, &module, "boom");
    handler.report(&registry, &module, "boom");
    handler.reset(&module);

    let report = handler.report(&registry, &module, "boom");
    assert!(!report.paused);
    assert_eq!(handler.failure_count(&module), 1);
}
