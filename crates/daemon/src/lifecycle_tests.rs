// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use finger_hub::{ModuleType, PatternSpec, RegistryEntry, RouteId, RouteSpec};
use tempfile::tempdir;

fn test_config(home: &std::path::Path) -> Config {
    let mut config = Config::at_home(home.to_path_buf());
    config.allow_direct_route = true;
    config.blocking_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn startup_writes_pid_and_registers_default_modules() {
    let home = tempdir().unwrap();
    let daemon = startup(test_config(home.path())).await.unwrap();

    let pid: u32 = std::fs::read_to_string(&daemon.config.pid_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    let ids: Vec<String> = daemon
        .hub
        .entries()
        .into_iter()
        .map(|e| e.id.to_string())
        .collect();
    assert!(ids.contains(&PRIMARY_TARGET.to_string()));
    assert!(ids.contains(&modules::DEFAULT_EXECUTOR.to_string()));

    // system_started was emitted.
    let types: Vec<_> = daemon
        .events
        .recent(10)
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert!(types.contains(&finger_core::EventType::SystemStarted));

    daemon.shutdown();
    assert!(!daemon.config.pid_path.exists());
}

#[tokio::test]
async fn second_daemon_fails_to_lock() {
    let home = tempdir().unwrap();
    let daemon = startup(test_config(home.path())).await.unwrap();

    let err = startup(test_config(home.path())).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    // The running daemon's pid file is untouched.
    assert!(daemon.config.pid_path.exists());

    daemon.shutdown();
}

#[tokio::test]
async fn snapshot_recovery_restores_entries_and_routes() {
    let home = tempdir().unwrap();
    let config = test_config(home.path());

    // Seed a snapshot: two entries, one route.
    let snapshot = finger_hub::RegistrySnapshot {
        entries: vec![
            RegistryEntry::new(ModuleId::new("survivor-a"), ModuleType::Output, "agent", 7),
            RegistryEntry::new(ModuleId::new("survivor-b"), ModuleType::Input, "gateway", 9),
        ],
        routes: vec![RouteSpec {
            id: RouteId::new("route-keep"),
            kind: Some("chat".to_string()),
            source: None,
            pattern: Some(PatternSpec::Regex("hello".to_string())),
            dest: vec![ModuleId::new("survivor-a")],
            priority: 42,
        }],
        saved_at: 1,
    };
    finger_storage::save_json(&config.snapshot_path, &snapshot).unwrap();

    let daemon = startup(config).await.unwrap();
    let exported = daemon.hub.export_snapshot();

    let ids: Vec<&str> = exported.entries.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"survivor-a"));
    assert!(ids.contains(&"survivor-b"));

    let route = exported
        .routes
        .iter()
        .find(|r| r.id == "route-keep")
        .unwrap();
    assert_eq!(route.priority, 42);
    assert_eq!(route.kind.as_deref(), Some("chat"));
    assert_eq!(route.pattern, Some(PatternSpec::Regex("hello".to_string())));

    daemon.shutdown();
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let home = tempdir().unwrap();
    let config = test_config(home.path());
    std::fs::create_dir_all(&config.home).unwrap();
    std::fs::write(&config.snapshot_path, b"garbage{{{").unwrap();

    let daemon = startup(config.clone()).await.unwrap();
    // Only the default modules exist.
    let ids: Vec<String> = daemon
        .hub
        .entries()
        .into_iter()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(ids.len(), 2);
    // Corrupt file was rotated aside.
    assert!(config.snapshot_path.with_extension("bak").exists());

    daemon.shutdown();
}

#[tokio::test]
async fn shutdown_flushes_a_loadable_snapshot() {
    let home = tempdir().unwrap();
    let config = test_config(home.path());
    let daemon = startup(config.clone()).await.unwrap();

    daemon.hub.register_external(RegistryEntry::new(
        ModuleId::new("late-agent"),
        ModuleType::Output,
        "agent",
        daemon.minter.now_ms(),
    ));
    daemon
        .hub
        .add_route(RouteMatch::for_kind("work"), vec![ModuleId::new("late-agent")], 5);
    daemon.shutdown();

    let snapshot: finger_hub::RegistrySnapshot =
        finger_storage::load_json(&config.snapshot_path).unwrap().unwrap();
    assert!(snapshot.entries.iter().any(|e| e.id == "late-agent"));
    assert!(snapshot.routes.iter().any(|r| r.priority == 5));
}

#[tokio::test]
async fn config_paths_hang_off_home() {
    let config = Config::at_home(std::path::PathBuf::from("/srv/finger"));
    assert_eq!(config.pid_path, std::path::PathBuf::from("/srv/finger/daemon.pid"));
    assert_eq!(config.snapshot_path, std::path::PathBuf::from("/srv/finger/snapshot.json"));
    assert_eq!(config.session_dir, std::path::PathBuf::from("/srv/finger/session"));
    assert_eq!(config.checkpoints_dir, std::path::PathBuf::from("/srv/finger/session-states"));
    assert_eq!(config.workflows_dir, std::path::PathBuf::from("/srv/finger/workflows"));
    assert_eq!(config.logs_dir, std::path::PathBuf::from("/srv/finger/logs"));
    assert_eq!(config.primary_target, ModuleId::new(PRIMARY_TARGET));
}
