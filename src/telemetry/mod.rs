//! Task telemetry reconciliation and presentation feed.
//!
//! `TelemetryEngine` is constructed per session and owns every piece of
//! mutable state: event logs, the notification scheduler, snapshots with
//! their freshness markers, in-flight follow-ups, chat lists, diffs and the
//! feed memo. All of it sits behind `RefCell` because the engine runs on a
//! single thread inside a `tokio::task::LocalSet`. No borrow is ever held
//! across an `.await`.

pub mod chat;
pub mod diff_cache;
pub mod event_log;
pub mod followup;
pub mod ids;
pub mod interleave;
pub mod reconciler;
pub mod scheduler;
pub mod types;
pub mod window;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, PushEvent};
use crate::config::EngineConfig;
use crate::telemetry::chat::ChatLog;
use crate::telemetry::diff_cache::DiffCache;
use crate::telemetry::event_log::EventLogStore;
use crate::telemetry::interleave::{FeedCache, FeedEntry, FeedItem, FeedKey};
use crate::telemetry::reconciler::{PollOutcome, SnapshotReconciler};
use crate::telemetry::scheduler::{NotificationScheduler, Published};
use crate::telemetry::types::{ChatMessage, DiffResult, TaskExecutionEvent, TaskSnapshot, TaskStatus};

pub struct TelemetryEngine {
    session_id: String,
    backend: Rc<dyn Backend>,
    logs: RefCell<EventLogStore>,
    scheduler: RefCell<NotificationScheduler>,
    reconciler: RefCell<SnapshotReconciler>,
    chats: RefCell<ChatLog>,
    diffs: RefCell<DiffCache>,
    feeds: RefCell<HashMap<String, FeedCache>>,
}

impl TelemetryEngine {
    pub fn new(session_id: impl Into<String>, backend: Rc<dyn Backend>, config: &EngineConfig) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            logs: RefCell::new(EventLogStore::new(config.log.high_water, config.log.retain)),
            scheduler: RefCell::new(NotificationScheduler::new()),
            reconciler: RefCell::new(SnapshotReconciler::new(config.stale_window())),
            chats: RefCell::new(ChatLog::new()),
            diffs: RefCell::new(DiffCache::new()),
            feeds: RefCell::new(HashMap::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    // ── Ingest ───────────────────────────────────────────────────────────

    /// Seed logs from the server replay, then take an initial poll.
    ///
    /// Both steps are transport operations: failures are logged and the
    /// engine carries on with whatever the push channel delivers.
    pub async fn attach(&self) {
        match self.backend.get_session_stream_events(&self.session_id).await {
            Ok(streams) => {
                let mut seeded = 0usize;
                for (task_id, events) in streams {
                    if self.backfill(&task_id, events) {
                        seeded += 1;
                    }
                }
                info!(session = %self.session_id, seeded, "backfill applied");
            }
            Err(err) => warn!(session = %self.session_id, "backfill failed: {err:#}"),
        }
        if let Err(err) = self.poll_once().await {
            warn!(session = %self.session_id, "initial poll failed: {err:#}");
        }
    }

    /// Seed one task's log if nothing has been observed for it yet.
    pub fn backfill(&self, task_id: &str, events: Vec<TaskExecutionEvent>) -> bool {
        let applied = self.logs.borrow_mut().backfill(task_id, events);
        if applied {
            self.scheduler.borrow_mut().mark_dirty(task_id);
        } else {
            debug!(task_id, "backfill skipped, live events already present");
        }
        applied
    }

    /// Append a streamed event and mark its task dirty for the next tick.
    pub fn ingest(&self, event: TaskExecutionEvent) -> usize {
        let task_id = event.task_id.clone();
        let outcome = self.logs.borrow_mut().append_with_outcome(&task_id, event);
        if outcome.pruned > 0 {
            debug!(task_id = %task_id, pruned = outcome.pruned, len = outcome.len, "event log pruned");
        }
        self.scheduler.borrow_mut().mark_dirty(&task_id);
        outcome.len
    }

    /// Apply one push-channel notification.
    pub async fn handle_push(&self, event: PushEvent) {
        match event {
            PushEvent::TaskStream(event) => {
                self.ingest(event);
            }
            PushEvent::TaskStatus { task_id, status } => {
                self.refresh_task(&task_id, status).await;
            }
            PushEvent::TaskDiff { task_id, diff } => {
                self.diffs.borrow_mut().replace(&task_id, diff);
            }
            PushEvent::SessionStatus { session_id } => {
                if session_id != self.session_id {
                    debug!(%session_id, "ignoring status for another session");
                    return;
                }
                if let Err(err) = self.poll_once().await {
                    warn!(session = %self.session_id, "session re-fetch failed: {err:#}");
                }
            }
        }
    }

    /// Re-fetch a task after a status notification and apply it as a push.
    ///
    /// The status carried by the push is applied over whatever the fetch
    /// returned. When the fetch fails it is patched onto the last known
    /// snapshot, so freshness and in-flight clearing still take effect.
    async fn refresh_task(&self, task_id: &str, status: TaskStatus) {
        let mut snapshot = match self.backend.get_task(task_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(task_id, "task re-fetch failed: {err:#}");
                let Some(known) = self.snapshot(task_id) else {
                    debug!(task_id, %status, "dropping status for unknown task");
                    return;
                };
                known
            }
        };
        // The pushed status wins over a fetch served by a lagging replica.
        if snapshot.status != status {
            debug!(task_id, fetched = %snapshot.status, pushed = %status, "fetched status lags push");
            snapshot.status = status;
        }
        debug!(task_id, status = %snapshot.status, "applying pushed snapshot");
        self.reconciler.borrow_mut().apply_push(task_id, snapshot);
    }

    /// Fetch the session's task list and merge it under the freshness rules.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let polled = self
            .backend
            .list_tasks(&self.session_id)
            .await
            .context("listing tasks")?;
        let outcome = self.reconciler.borrow_mut().apply_poll(polled);
        debug!(
            applied = outcome.applied.len(),
            discarded = outcome.discarded.len(),
            "poll merged"
        );
        Ok(outcome)
    }

    /// Poll on a fixed interval until `cancel` fires. Failed polls are
    /// retried at the next interval.
    pub async fn run_poll_loop(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        warn!(session = %self.session_id, "poll failed, retrying next interval: {err:#}");
                    }
                }
            }
        }
        debug!(session = %self.session_id, "poll loop stopped");
    }

    /// Drain push notifications until the channel closes or `cancel` fires.
    pub async fn run_push_loop(&self, mut rx: mpsc::UnboundedReceiver<PushEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => self.handle_push(event).await,
                    None => break,
                },
            }
        }
        debug!(session = %self.session_id, "push loop stopped");
    }

    // ── Tick ─────────────────────────────────────────────────────────────

    /// Render-tick boundary: publish one length per dirty task.
    pub fn flush(&self) -> Vec<Published> {
        let logs = self.logs.borrow();
        self.scheduler.borrow_mut().flush(&logs)
    }

    /// Flush on every tick until `cancel` fires, for headless consumers.
    pub async fn run_flush_ticker(&self, tick: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush();
                }
            }
        }
        self.flush();
    }

    pub fn subscribe(&self, task_id: &str) -> watch::Receiver<usize> {
        self.scheduler.borrow_mut().subscribe(task_id)
    }

    // ── Read side ────────────────────────────────────────────────────────

    /// Current absolute length of a task's event log.
    pub fn log_len(&self, task_id: &str) -> usize {
        self.logs.borrow().len(task_id)
    }

    /// Absolute index of the oldest retained event.
    pub fn log_base(&self, task_id: &str) -> usize {
        self.logs.borrow().get(task_id).map(|l| l.base()).unwrap_or(0)
    }

    /// Merged feed positions for a task, as of the last flush.
    ///
    /// Log events appended since the last flush are not part of the feed
    /// yet; they appear once the next tick publishes the new length.
    pub fn feed_entries(&self, task_id: &str) -> Rc<[FeedEntry]> {
        let logs = self.logs.borrow();
        let chats = self.chats.borrow();
        let base = logs.get(task_id).map(|l| l.base()).unwrap_or(0);
        let published = self.scheduler.borrow().published(task_id);
        let messages = chats.messages(task_id);
        let key = FeedKey {
            base,
            len: published.max(base),
            chat_len: messages.len(),
            chat_generation: chats.generation(task_id),
        };
        self.feeds
            .borrow_mut()
            .entry(task_id.to_string())
            .or_default()
            .get_or_compute(key, messages)
    }

    /// Run `f` over the resolved feed for a task.
    pub fn with_feed<R>(&self, task_id: &str, f: impl FnOnce(&[FeedItem<'_>]) -> R) -> R {
        let entries = self.feed_entries(task_id);
        let logs = self.logs.borrow();
        let chats = self.chats.borrow();
        let items = interleave::resolve(&entries, logs.get(task_id), chats.messages(task_id));
        f(&items)
    }

    pub fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.reconciler.borrow().snapshot(task_id).cloned()
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.reconciler
            .borrow()
            .snapshots()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every task the engine knows about, from snapshots or logs.
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self
            .reconciler
            .borrow()
            .snapshots()
            .into_iter()
            .map(|s| s.id.clone())
            .collect();
        ids.extend(self.logs.borrow().task_ids().map(str::to_string));
        ids.into_iter().collect()
    }

    pub fn is_in_flight(&self, task_id: &str) -> bool {
        self.reconciler.borrow().is_in_flight(task_id)
    }

    pub fn diff(&self, task_id: &str) -> Option<DiffResult> {
        self.diffs.borrow().get(task_id).cloned()
    }

    pub fn chat_messages(&self, task_id: &str) -> Vec<ChatMessage> {
        self.chats.borrow().messages(task_id).to_vec()
    }

    /// Drop every chat message for a task (explicit user request).
    pub fn clear_chat(&self, task_id: &str) {
        self.chats.borrow_mut().clear(task_id);
    }

    // ── Internal mutation used by the dispatcher and diff cache ─────────

    pub(crate) fn push_chat(&self, task_id: &str, message: ChatMessage) {
        self.chats.borrow_mut().push(task_id, message);
    }

    pub(crate) fn reconciler(&self) -> &RefCell<SnapshotReconciler> {
        &self.reconciler
    }

    pub(crate) fn diffs(&self) -> &RefCell<DiffCache> {
        &self.diffs
    }
}
