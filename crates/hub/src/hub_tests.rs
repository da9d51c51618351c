// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{Pattern, RouteMatch};
use finger_core::{FakeClock, Message, MessageId, Minter, MonotonicStamper};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

fn test_hub() -> MessageHub {
    let minter = Minter::new(MonotonicStamper::new(FakeClock::at(1_000)));
    MessageHub::new(minter)
}

fn msg(hub: &MessageHub, kind: &str) -> Message {
    Message::new(
        MessageId::new(hub.minter().mint("msg")),
        kind,
        hub.minter().now_ms(),
        ModuleId::new("test"),
        json!({"text": "hi"}),
    )
}

/// Handler that echoes its input back, optionally blocking.
struct Echo {
    name: &'static str,
    blocking: bool,
    calls: AtomicUsize,
}

impl Echo {
    fn new(name: &'static str, blocking: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            blocking,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MessageHandler for Echo {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(json!({"handler": self.name, "received": message.payload}))
    }

    fn blocking(&self) -> bool {
        self.blocking
    }
}

/// Handler that always fails.
struct Failing;

#[async_trait]
impl MessageHandler for Failing {
    async fn handle(&self, _message: Message) -> Result<Value, HandlerError> {
        Err("deliberate failure".into())
    }

    fn blocking(&self) -> bool {
        true
    }
}

/// Handler that records the order it was called in.
struct Recorder {
    tag: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, _message: Message) -> Result<Value, HandlerError> {
        self.order.lock().push(self.tag);
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn blocking_send_returns_handler_value() {
    let hub = test_hub();
    hub.register_input(
        ModuleId::new("echo-input"),
        Echo::new("echo-input", true),
        vec![(RouteMatch::for_kind("m"), 0)],
        RegisterOptions::kind("echo"),
    );

    let outcome = hub.send(msg(&hub, "m")).await.unwrap();
    match outcome {
        SendOutcome::Blocking(value) => {
            assert_eq!(value["handler"], "echo-input");
            assert_eq!(value["received"]["text"], "hi");
        }
        other => panic!("expected blocking outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn unmatched_messages_queue_and_redispatch() {
    let hub = test_hub();
    assert!(matches!(
        hub.send(msg(&hub, "later")).await.unwrap(),
        SendOutcome::Queued
    ));
    assert_eq!(hub.queued(), 1);

    // Still no route: stays queued.
    assert_eq!(hub.process_queue().await, 0);
    assert_eq!(hub.queued(), 1);

    let echo = Echo::new("late", false);
    hub.register_input(
        ModuleId::new("late"),
        echo.clone(),
        vec![(RouteMatch::for_kind("later"), 0)],
        RegisterOptions::default(),
    );

    assert_eq!(hub.process_queue().await, 1);
    assert_eq!(hub.queued(), 0);
    assert_eq!(echo.calls.load(AtomicOrdering::SeqCst), 1);
}

#[tokio::test]
async fn priority_order_selects_blocking_handler_first() {
    let hub = test_hub();
    let low = Echo::new("low", true);
    let high = Echo::new("high", true);
    hub.register_output(ModuleId::new("low"), low.clone(), RegisterOptions::default());
    hub.register_output(ModuleId::new("high"), high.clone(), RegisterOptions::default());
    hub.add_route(RouteMatch::for_kind("m"), vec![ModuleId::new("low")], 1);
    hub.add_route(RouteMatch::for_kind("m"), vec![ModuleId::new("high")], 9);

    let outcome = hub.send(msg(&hub, "m")).await.unwrap();
    match outcome {
        SendOutcome::Blocking(value) => assert_eq!(value["handler"], "high"),
        other => panic!("unexpected outcome {other:?}"),
    }
    // The lower-priority blocking handler never ran.
    assert_eq!(low.calls.load(AtomicOrdering::SeqCst), 0);
}

#[tokio::test]
async fn non_blocking_handlers_run_in_declared_order() {
    let hub = test_hub();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [("first", 5), ("second", 3)] {
        hub.register_output(
            ModuleId::new(name),
            Arc::new(Recorder {
                tag: name,
                order: Arc::clone(&order),
            }),
            RegisterOptions::default(),
        );
        hub.add_route(RouteMatch::for_kind("m"), vec![ModuleId::new(name)], priority);
    }

    let outcome = hub.send(msg(&hub, "m")).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Dispatched { handlers: 2 }));
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[tokio::test]
async fn blocking_failure_returns_structured_error() {
    let hub = test_hub();
    hub.register_input(
        ModuleId::new("bad"),
        Arc::new(Failing),
        vec![(RouteMatch::for_kind("m"), 0)],
        RegisterOptions::default(),
    );

    let outcome = hub.send(msg(&hub, "m")).await.unwrap();
    match outcome {
        SendOutcome::BlockingFailed(failure) => {
            assert!(failure.error);
            assert!(failure.detail.contains("deliberate failure"));
            assert!(!failure.paused); // first failure, below threshold
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn send_to_module_bypasses_routes_and_fails_fast() {
    let hub = test_hub();
    hub.register_output(
        ModuleId::new("direct"),
        Echo::new("direct", false),
        RegisterOptions::default(),
    );

    let value = hub
        .send_to_module(&ModuleId::new("direct"), msg(&hub, "anything"))
        .await
        .unwrap();
    assert_eq!(value["handler"], "direct");

    let err = hub
        .send_to_module(&ModuleId::new("missing"), msg(&hub, "m"))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotRegistered(_)));
    assert!(err.to_string().contains("not registered"));
}

#[tokio::test]
async fn route_to_output_attaches_callback_id() {
    let hub = test_hub();
    let seen = Arc::new(Mutex::new(None::<Message>));
    struct Capture(Arc<Mutex<Option<Message>>>);

    #[async_trait]
    impl MessageHandler for Capture {
        async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
            *self.0.lock() = Some(message);
            Ok(Value::Null)
        }
    }

    hub.register_output(
        ModuleId::new("out"),
        Arc::new(Capture(Arc::clone(&seen))),
        RegisterOptions::default(),
    );

    let resolved = Arc::new(Mutex::new(None::<Value>));
    let resolved_clone = Arc::clone(&resolved);
    let callback_id = hub
        .route_to_output(
            &ModuleId::new("out"),
            msg(&hub, "work"),
            Some(Box::new(move |value| {
                *resolved_clone.lock() = Some(value);
            })),
        )
        .await
        .unwrap()
        .unwrap();

    // Callback id travelled with the message.
    let delivered = seen.lock().clone().unwrap();
    assert_eq!(delivered.callback_id.as_ref().unwrap(), &callback_id);
    assert_eq!(hub.pending_callbacks(), 1);

    // Resolves exactly once.
    hub.execute_callback(&callback_id, json!({"done": true})).unwrap();
    assert_eq!(resolved.lock().clone().unwrap()["done"], true);
    assert!(matches!(
        hub.execute_callback(&callback_id, Value::Null),
        Err(HubError::CallbackNotFound(_))
    ));
}

#[tokio::test]
async fn send_with_callback_attaches_a_pending_callback() {
    let hub = test_hub();
    hub.register_input(
        ModuleId::new("echo"),
        Echo::new("echo", false),
        vec![(RouteMatch::for_kind("m"), 0)],
        RegisterOptions::default(),
    );

    let resolved = Arc::new(Mutex::new(None::<Value>));
    let resolved_clone = Arc::clone(&resolved);
    let (callback_id, outcome) = hub
        .send_with_callback(
            msg(&hub, "m"),
            Box::new(move |value| {
                *resolved_clone.lock() = Some(value);
            }),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, SendOutcome::Dispatched { handlers: 1 }));
    assert_eq!(hub.pending_callbacks(), 1);

    hub.execute_callback(&callback_id, json!({"late": true})).unwrap();
    assert_eq!(resolved.lock().clone().unwrap()["late"], true);
    assert_eq!(hub.pending_callbacks(), 0);
}

#[tokio::test]
async fn second_register_replaces_handler_and_routes() {
    let hub = test_hub();
    let first = Echo::new("first", true);
    let second = Echo::new("second", true);

    let initial_routes = hub.register_input(
        ModuleId::new("dup"),
        first.clone(),
        vec![(RouteMatch::for_kind("old"), 0)],
        RegisterOptions::default(),
    );
    hub.register_input(
        ModuleId::new("dup"),
        second.clone(),
        vec![(RouteMatch::for_kind("new"), 0)],
        RegisterOptions::default(),
    );

    // Old route is gone; its messages queue.
    assert!(matches!(
        hub.send(msg(&hub, "old")).await.unwrap(),
        SendOutcome::Queued
    ));
    // New route hits the replacement handler.
    match hub.send(msg(&hub, "new")).await.unwrap() {
        SendOutcome::Blocking(value) => assert_eq!(value["handler"], "second"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(first.calls.load(AtomicOrdering::SeqCst), 0);
    assert_eq!(hub.entries().len(), 1);
    assert!(!initial_routes.is_empty());
}

#[tokio::test]
async fn unregister_removes_entry_and_routes() {
    let hub = test_hub();
    hub.register_input(
        ModuleId::new("gone"),
        Echo::new("gone", false),
        vec![(RouteMatch::for_kind("m"), 0)],
        RegisterOptions::default(),
    );
    assert!(hub.unregister(&ModuleId::new("gone")));
    assert!(hub.entries().is_empty());
    assert!(matches!(
        hub.send(msg(&hub, "m")).await.unwrap(),
        SendOutcome::Queued
    ));
    assert!(!hub.unregister(&ModuleId::new("gone")));
}

#[tokio::test]
async fn paused_modules_receive_nothing() {
    let hub = test_hub();
    let echo = Echo::new("paused", false);
    hub.register_input(
        ModuleId::new("paused"),
        echo.clone(),
        vec![(RouteMatch::for_kind("m"), 0)],
        RegisterOptions::default(),
    );
    hub.set_status(&ModuleId::new("paused"), EntryStatus::Paused);

    assert!(matches!(
        hub.send(msg(&hub, "m")).await.unwrap(),
        SendOutcome::Queued
    ));
    assert_eq!(echo.calls.load(AtomicOrdering::SeqCst), 0);
}

#[tokio::test]
async fn single_writer_serializes_dispatches() {
    let hub = Arc::new(test_hub());

    /// Handler that records concurrent entries.
    struct Slow {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Slow {
        async fn handle(&self, _message: Message) -> Result<Value, HandlerError> {
            let now = self.active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.max_active.fetch_max(now, AtomicOrdering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.active.fetch_sub(1, AtomicOrdering::SeqCst);
            Ok(Value::Null)
        }
    }

    let slow = Arc::new(Slow {
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
    });
    hub.register_output(
        ModuleId::new("executor-1"),
        slow.clone(),
        RegisterOptions::kind("executor").single_writer(),
    );

    let mut joins = Vec::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        let message = msg(&hub, "work");
        joins.push(tokio::spawn(async move {
            hub.send_to_module(&ModuleId::new("executor-1"), message).await
        }));
    }
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert_eq!(slow.max_active.load(AtomicOrdering::SeqCst), 1);
}

#[tokio::test]
async fn regex_route_matches_message_json() {
    let hub = test_hub();
    let echo = Echo::new("rex", false);
    hub.register_output(ModuleId::new("rex"), echo.clone(), RegisterOptions::default());
    hub.add_route(
        RouteMatch::for_pattern(Pattern::regex(r#""text":"hi""#).unwrap()),
        vec![ModuleId::new("rex")],
        0,
    );

    assert!(matches!(
        hub.send(msg(&hub, "anything")).await.unwrap(),
        SendOutcome::Dispatched { handlers: 1 }
    ));
}

#[tokio::test]
async fn snapshot_export_import_round_trip() {
    let hub = test_hub();
    hub.register_output(
        ModuleId::new("keep"),
        Echo::new("keep", false),
        RegisterOptions::kind("echo"),
    );
    hub.add_route(RouteMatch::for_kind("m"), vec![ModuleId::new("keep")], 4);

    let snapshot = hub.export_snapshot();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.routes.len(), 1);

    let other = test_hub();
    other.import_snapshot(snapshot.clone());
    let reexported = other.export_snapshot();
    assert_eq!(reexported.entries, snapshot.entries);
    assert_eq!(reexported.routes, snapshot.routes);
}

#[tokio::test]
async fn dirty_flag_set_on_mutations() {
    let hub = test_hub();
    let dirty = hub.dirty_flag();
    assert!(!dirty.load(Ordering::SeqCst));

    hub.register_output(
        ModuleId::new("a"),
        Echo::new("a", false),
        RegisterOptions::default(),
    );
    assert!(dirty.swap(false, Ordering::SeqCst));

    hub.touch_heartbeat(&ModuleId::new("a"));
    assert!(dirty.load(Ordering::SeqCst));
}

#[tokio::test]
async fn bad_message_fails_fast() {
    let hub = test_hub();
    let bad = Message::new(
        MessageId::new(""),
        "m",
        0,
        ModuleId::new("s"),
        Value::Null,
    );
    assert!(matches!(
        hub.send(bad).await.unwrap_err(),
        HubError::BadMessage(_)
    ));
}
