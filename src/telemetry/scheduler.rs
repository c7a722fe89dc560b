//! Coalesces event-log appends into one published change per tick.
//!
//! Appends only mark a task dirty. At the tick boundary `flush` publishes
//! each dirty task's absolute log length through a `watch` channel; the
//! length is the only thing subscribers react to, after which they read
//! the events straight from the `EventLogStore`.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::watch;

use crate::telemetry::event_log::EventLogStore;

/// One published change produced by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub task_id: String,
    pub len: usize,
}

#[derive(Debug, Default)]
pub struct NotificationScheduler {
    dirty: BTreeSet<String>,
    channels: HashMap<String, watch::Sender<usize>>,
    flushes: u64,
}

impl NotificationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a task has new data. Idempotent within a tick.
    pub fn mark_dirty(&mut self, task_id: &str) {
        if !self.dirty.contains(task_id) {
            self.dirty.insert(task_id.to_string());
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Subscribe to a task's published log length.
    pub fn subscribe(&mut self, task_id: &str) -> watch::Receiver<usize> {
        self.channel(task_id).subscribe()
    }

    /// Last length published for a task.
    pub fn published(&self, task_id: &str) -> usize {
        self.channels
            .get(task_id)
            .map(|tx| *tx.borrow())
            .unwrap_or(0)
    }

    /// Number of flushes that published at least one change.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Publish the current length of every dirty task, once each.
    ///
    /// Tasks whose length did not actually change since the last publish
    /// are skipped. Order across tasks is not meaningful.
    pub fn flush(&mut self, logs: &EventLogStore) -> Vec<Published> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut published = Vec::with_capacity(dirty.len());
        for task_id in dirty {
            let len = logs.len(&task_id);
            let changed = self.channel(&task_id).send_if_modified(|current| {
                if *current == len {
                    false
                } else {
                    *current = len;
                    true
                }
            });
            if changed {
                published.push(Published { task_id, len });
            }
        }
        if !published.is_empty() {
            self.flushes += 1;
            tracing::trace!(tasks = published.len(), "published log lengths");
        }
        published
    }

    fn channel(&mut self, task_id: &str) -> &watch::Sender<usize> {
        self.channels
            .entry(task_id.to_string())
            .or_insert_with(|| watch::channel(0).0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::{EventKind, TaskExecutionEvent};

    fn append(logs: &mut EventLogStore, scheduler: &mut NotificationScheduler, task: &str) {
        logs.append(task, TaskExecutionEvent::new(task, EventKind::Text, "x"));
        scheduler.mark_dirty(task);
    }

    #[test]
    fn fifty_appends_in_one_tick_publish_once() {
        let mut logs = EventLogStore::default();
        let mut scheduler = NotificationScheduler::new();
        let mut rx = scheduler.subscribe("t-1");

        for _ in 0..50 {
            append(&mut logs, &mut scheduler, "t-1");
        }
        assert_eq!(*rx.borrow(), 0, "nothing is visible before the tick");

        let published = scheduler.flush(&logs);
        assert_eq!(
            published,
            vec![Published {
                task_id: "t-1".to_string(),
                len: 50
            }]
        );
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 50);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    fn flush_without_new_data_publishes_nothing() {
        let mut logs = EventLogStore::default();
        let mut scheduler = NotificationScheduler::new();
        append(&mut logs, &mut scheduler, "t-1");
        scheduler.flush(&logs);

        assert!(scheduler.flush(&logs).is_empty());
        scheduler.mark_dirty("t-1");
        assert!(scheduler.flush(&logs).is_empty());
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    fn flush_publishes_each_dirty_task() {
        let mut logs = EventLogStore::default();
        let mut scheduler = NotificationScheduler::new();
        append(&mut logs, &mut scheduler, "t-1");
        append(&mut logs, &mut scheduler, "t-2");
        append(&mut logs, &mut scheduler, "t-2");

        let mut published = scheduler.flush(&logs);
        published.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].len, 2);
        assert_eq!(scheduler.published("t-2"), 2);
        assert!(!scheduler.has_pending());
    }
}
