//! End-to-end flows through `TelemetryEngine` against the in-memory backend.

use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;

use tasklens::backend::memory::{InMemoryBackend, Rpc};
use tasklens::backend::replay::{self, Recording};
use tasklens::backend::PushEvent;
use tasklens::config::EngineConfig;
use tasklens::telemetry::followup::SendOutcome;
use tasklens::telemetry::interleave::FeedItem;
use tasklens::telemetry::types::{
    ChatKind, ChatRole, EventKind, FollowUpMode, TaskExecutionEvent, TaskSnapshot, TaskStatus,
};
use tasklens::telemetry::window::{FeedWindow, WindowConfig};
use tasklens::telemetry::TelemetryEngine;

fn engine_with(config: &EngineConfig) -> (Rc<InMemoryBackend>, TelemetryEngine) {
    let backend = Rc::new(InMemoryBackend::new());
    let engine = TelemetryEngine::new("s-1", backend.clone(), config);
    (backend, engine)
}

fn engine() -> (Rc<InMemoryBackend>, TelemetryEngine) {
    engine_with(&EngineConfig::default())
}

fn text(task_id: &str, content: &str) -> TaskExecutionEvent {
    TaskExecutionEvent::new(task_id, EventKind::Text, content)
}

/// Compact description of a feed: `e<N>` for log events, `m` for chat.
fn shape(engine: &TelemetryEngine, task_id: &str) -> Vec<String> {
    engine.with_feed(task_id, |items| {
        items
            .iter()
            .map(|item| match item {
                FeedItem::Log { index, .. } => format!("e{index}"),
                FeedItem::Chat(_) => "m".to_string(),
            })
            .collect()
    })
}

#[tokio::test(start_paused = true)]
async fn pushed_status_beats_stale_poll_until_window_expires() {
    let (backend, engine) = engine();
    backend.upsert_task(TaskSnapshot::new("t-1", TaskStatus::Running));
    engine.attach().await;
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Running);

    backend.set_status("t-1", TaskStatus::Completed);
    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-1".into(),
            status: TaskStatus::Completed,
        })
        .await;

    // A lagging replica still reports the old status.
    backend.set_status("t-1", TaskStatus::Running);
    tokio::time::advance(Duration::from_millis(1000)).await;
    let outcome = engine.poll_once().await.unwrap();
    assert_eq!(outcome.discarded, vec!["t-1".to_string()]);
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Completed);

    tokio::time::advance(Duration::from_millis(5000)).await;
    let outcome = engine.poll_once().await.unwrap();
    assert!(outcome.discarded.is_empty());
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Running);
}

#[tokio::test]
async fn status_push_falls_back_to_pushed_status_when_refetch_fails() {
    let (backend, engine) = engine();
    backend.upsert_task(TaskSnapshot::new("t-1", TaskStatus::Running));
    engine.attach().await;

    backend.fail(Rpc::GetTask);
    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-1".into(),
            status: TaskStatus::Failed,
        })
        .await;
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Failed);

    // Nothing known about t-2, so its status push is dropped.
    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-2".into(),
            status: TaskStatus::Running,
        })
        .await;
    assert!(engine.snapshot("t-2").is_none());
}

#[tokio::test]
async fn follow_up_is_interleaved_at_its_anchor() {
    let (_backend, engine) = engine();
    engine.ingest(text("t-1", "e0"));
    engine.flush();

    let outcome = engine
        .send_follow_up("t-1", "please also add tests", FollowUpMode::Execute, Vec::new())
        .await;
    assert_eq!(outcome, SendOutcome::Delivered);

    engine.ingest(text("t-1", "e1"));
    engine.ingest(text("t-1", "e2"));
    engine.flush();

    assert_eq!(shape(&engine, "t-1"), vec!["e0", "m", "e1", "e2"]);
}

#[tokio::test]
async fn backfill_never_overwrites_live_events() {
    let (backend, engine) = engine();
    for i in 0..3 {
        backend.record_stream_event(text("t-1", &format!("replayed {i}")));
        backend.record_stream_event(text("t-2", &format!("replayed {i}")));
    }

    // t-1 streamed live before the replay came back.
    engine.ingest(text("t-1", "live"));
    engine.attach().await;
    engine.flush();

    assert_eq!(engine.log_len("t-1"), 1);
    assert_eq!(engine.log_len("t-2"), 3);
    let first = engine.with_feed("t-1", |items| match items.first() {
        Some(FeedItem::Log { event, .. }) => event.content.clone(),
        _ => String::new(),
    });
    assert_eq!(first, "live");
}

#[tokio::test]
async fn burst_of_events_publishes_once_per_tick() {
    let (_backend, engine) = engine();
    let mut rx = engine.subscribe("t-1");

    for i in 0..50 {
        engine.ingest(text("t-1", &format!("burst {i}")));
    }
    assert!(!rx.has_changed().unwrap());
    assert!(shape(&engine, "t-1").is_empty(), "events appear only after a flush");

    let published = engine.flush();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].len, 50);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), 50);
    assert_eq!(shape(&engine, "t-1").len(), 50);

    // Nothing new: the next tick publishes nothing.
    assert!(engine.flush().is_empty());
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn in_flight_clears_only_on_terminal_push() {
    let (backend, engine) = engine();
    backend.upsert_task(TaskSnapshot::new("t-1", TaskStatus::AwaitingReview));
    engine.attach().await;

    engine
        .send_follow_up("t-1", "continue", FollowUpMode::Plan, Vec::new())
        .await;
    assert!(engine.is_in_flight("t-1"));
    assert_eq!(backend.follow_ups()[0].mode, FollowUpMode::Plan);

    backend.set_status("t-1", TaskStatus::Running);
    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-1".into(),
            status: TaskStatus::Running,
        })
        .await;
    assert!(engine.is_in_flight("t-1"));

    // A poll reporting completion updates the snapshot but not the marker.
    backend.set_status("t-1", TaskStatus::Completed);
    tokio::time::advance(Duration::from_millis(6000)).await;
    engine.poll_once().await.unwrap();
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Completed);
    assert!(engine.is_in_flight("t-1"));

    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-1".into(),
            status: TaskStatus::Completed,
        })
        .await;
    assert!(!engine.is_in_flight("t-1"));
}

#[tokio::test(start_paused = true)]
async fn terminal_push_clears_in_flight_even_when_refetch_lags() {
    let (backend, engine) = engine();
    backend.upsert_task(TaskSnapshot::new("t-1", TaskStatus::Running));
    engine.attach().await;

    engine
        .send_follow_up("t-1", "wrap up", FollowUpMode::Execute, Vec::new())
        .await;
    assert!(engine.is_in_flight("t-1"));

    // The backend has not caught up with its own notification yet.
    engine
        .handle_push(PushEvent::TaskStatus {
            task_id: "t-1".into(),
            status: TaskStatus::Completed,
        })
        .await;
    assert!(!engine.is_in_flight("t-1"));
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Completed);

    // The lagging view is also kept out by the freshness window.
    tokio::time::advance(Duration::from_millis(1000)).await;
    let outcome = engine.poll_once().await.unwrap();
    assert_eq!(outcome.discarded, vec!["t-1".to_string()]);
    assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn failed_follow_up_keeps_message_and_reports_error() {
    let (backend, engine) = engine();
    backend.fail(Rpc::SendFollowUp);
    engine.ingest(text("t-1", "e0"));

    let outcome = engine
        .send_follow_up("t-1", "retry please", FollowUpMode::Execute, vec!["missing.rs".into()])
        .await;
    assert!(matches!(outcome, SendOutcome::Failed(_)));
    assert!(!engine.is_in_flight("t-1"));

    let chats = engine.chat_messages("t-1");
    assert_eq!(chats.len(), 3);
    assert_eq!(chats[0].role, ChatRole::User);
    assert_eq!(chats[0].content, "retry please");
    assert_eq!(chats[1].kind, Some(ChatKind::Notice));
    assert_eq!(chats[2].kind, Some(ChatKind::Error));
    assert!(chats.iter().all(|m| m.log_index == Some(1)));
}

#[tokio::test]
async fn pruned_anchor_renders_first() {
    let mut config = EngineConfig::default();
    config.log.high_water = 10;
    config.log.retain = 5;
    let (_backend, engine) = engine_with(&config);

    for i in 0..3 {
        engine.ingest(text("t-1", &format!("early {i}")));
    }
    engine
        .send_follow_up("t-1", "anchored at 3", FollowUpMode::Execute, Vec::new())
        .await;
    for i in 3..23 {
        engine.ingest(text("t-1", &format!("late {i}")));
    }
    engine.flush();

    let base = engine.log_base("t-1");
    assert_eq!(engine.log_len("t-1"), 23);
    assert!(base > 3);

    let feed = shape(&engine, "t-1");
    let mut expected = vec!["m".to_string()];
    expected.extend((base..23).map(|i| format!("e{i}")));
    assert_eq!(feed, expected);
}

#[tokio::test]
async fn cleared_chat_leaves_only_log_events() {
    let (_backend, engine) = engine();
    engine.ingest(text("t-1", "e0"));
    engine
        .send_follow_up("t-1", "hello", FollowUpMode::Execute, Vec::new())
        .await;
    engine.flush();
    assert_eq!(shape(&engine, "t-1"), vec!["e0", "m"]);

    engine.clear_chat("t-1");
    assert_eq!(shape(&engine, "t-1"), vec!["e0"]);
}

#[tokio::test]
async fn windowing_materializes_a_small_slice_of_a_long_feed() {
    let mut config = EngineConfig::default();
    config.log.high_water = 20_000;
    config.log.retain = 20_000;
    let (_backend, engine) = engine_with(&config);
    for i in 0..10_000 {
        engine.ingest(text("t-1", &format!("line {i}")));
    }
    engine.flush();

    let entries = engine.feed_entries("t-1");
    assert_eq!(entries.len(), 10_000);

    let mut window = FeedWindow::new(WindowConfig::default());
    window.sync_len(entries.len(), 0);
    window.set_viewport(21);
    window.scroll_to(500);

    let range = window.range().unwrap();
    assert_eq!(range.indices(), 480..=540);
    let visible = window.materialize(&entries[..]);
    assert_eq!(visible.len(), 61);
}

#[tokio::test(start_paused = true)]
async fn poll_loop_retries_after_failure_and_stops_on_cancel() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let (backend, engine) = engine();
            let engine = Rc::new(engine);
            backend.upsert_task(TaskSnapshot::new("t-1", TaskStatus::Queued));
            backend.fail(Rpc::ListTasks);

            let cancel = CancellationToken::new();
            let handle = tokio::task::spawn_local({
                let engine = Rc::clone(&engine);
                let cancel = cancel.clone();
                async move {
                    engine
                        .run_poll_loop(Duration::from_millis(100), cancel)
                        .await
                }
            });

            tokio::time::sleep(Duration::from_millis(250)).await;
            assert!(backend.list_calls() >= 2);
            assert!(engine.snapshot("t-1").is_none());

            backend.recover(Rpc::ListTasks);
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(engine.snapshot("t-1").unwrap().status, TaskStatus::Queued);

            cancel.cancel();
            handle.await.unwrap();
            let calls = backend.list_calls();
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(backend.list_calls(), calls);
        })
        .await;
}

const RECORDING: &str = r#"{
    "session_id": "s-1",
    "tasks": [{"id": "t-1", "title": "add parser", "status": "running"}],
    "backfill": {"t-1": [{"task_id": "t-1", "kind": "init", "content": "session started"}]},
    "timeline": [
        {"at_ms": 10, "event": {"type": "task:stream", "task_id": "t-1", "kind": "tool_use", "content": "[Read] src/lib.rs"}},
        {"at_ms": 20, "event": {"type": "task:stream", "task_id": "t-1", "kind": "text", "content": "done reading"}},
        {"at_ms": 30, "event": {"type": "task:diff", "task_id": "t-1", "diff": {"files": []}}},
        {"at_ms": 40, "event": {"type": "task:status", "task_id": "t-1", "status": "awaiting_review"}}
    ]
}"#;

#[tokio::test(start_paused = true)]
async fn replayed_session_reaches_final_state() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let recording = Recording::parse(RECORDING).unwrap();
            let backend = Rc::new(recording.backend());
            let engine = Rc::new(TelemetryEngine::new(
                recording.session_id.clone(),
                backend.clone(),
                &EngineConfig::default(),
            ));
            engine.attach().await;
            assert_eq!(engine.log_len("t-1"), 1);

            let cancel = CancellationToken::new();
            let (tx, rx) = mpsc::unbounded_channel();
            let push = tokio::task::spawn_local({
                let engine = Rc::clone(&engine);
                let cancel = cancel.clone();
                async move { engine.run_push_loop(rx, cancel).await }
            });

            let sent = replay::play(&recording, &backend, tx, 1.0, cancel.clone())
                .await
                .unwrap();
            assert_eq!(sent, 4);
            push.await.unwrap();
            engine.flush();

            assert_eq!(shape(&engine, "t-1"), vec!["e0", "e1", "e2"]);
            assert_eq!(
                engine.snapshot("t-1").unwrap().status,
                TaskStatus::AwaitingReview
            );
            assert_eq!(engine.diff("t-1").unwrap().files_changed(), 0);
        })
        .await;
}
