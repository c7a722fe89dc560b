//! Per-task append-only event logs kept outside the notification path.
//!
//! Appends are amortized O(1): each task owns a `Vec` that is only drained
//! from the front when it crosses the high-water mark. Lengths reported by
//! this store are absolute (every event ever appended), so they never
//! decrease; pruning only moves the `base` of the retained window forward.

use std::collections::HashMap;

use crate::telemetry::types::TaskExecutionEvent;

/// Default high-water mark before a task log is pruned.
pub const DEFAULT_HIGH_WATER: usize = 500;
/// Default number of most recent events kept after a prune.
pub const DEFAULT_RETAIN: usize = 400;

/// Retained tail of one task's log.
#[derive(Debug, Default, Clone)]
pub struct TaskLog {
    /// Absolute index of `events[0]`.
    base: usize,
    events: Vec<TaskExecutionEvent>,
}

impl TaskLog {
    /// Absolute index of the oldest retained event.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Absolute length: retained events plus everything pruned before them.
    pub fn len(&self) -> usize {
        self.base + self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> &[TaskExecutionEvent] {
        &self.events
    }

    /// Event at an absolute index, if it is still retained.
    pub fn get(&self, index: usize) -> Option<&TaskExecutionEvent> {
        index
            .checked_sub(self.base)
            .and_then(|offset| self.events.get(offset))
    }
}

/// Outcome of an append, used for logging and scroll compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Absolute length after the append.
    pub len: usize,
    /// Number of events dropped from the front by this append.
    pub pruned: usize,
}

#[derive(Debug)]
pub struct EventLogStore {
    logs: HashMap<String, TaskLog>,
    high_water: usize,
    retain: usize,
}

impl Default for EventLogStore {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER, DEFAULT_RETAIN)
    }
}

impl EventLogStore {
    /// `retain` is clamped to `high_water` so a prune always shrinks the log.
    pub fn new(high_water: usize, retain: usize) -> Self {
        Self {
            logs: HashMap::new(),
            high_water: high_water.max(1),
            retain: retain.clamp(1, high_water.max(1)),
        }
    }

    /// Append one event to the end of a task's log and return the new
    /// absolute length.
    pub fn append(&mut self, task_id: &str, event: TaskExecutionEvent) -> usize {
        self.append_with_outcome(task_id, event).len
    }

    pub fn append_with_outcome(&mut self, task_id: &str, event: TaskExecutionEvent) -> AppendOutcome {
        let log = self.logs.entry(task_id.to_string()).or_default();
        log.events.push(event);
        let pruned = prune(log, self.high_water, self.retain);
        AppendOutcome {
            len: log.len(),
            pruned,
        }
    }

    /// Read access to a task's log. Unknown tasks have no log.
    pub fn get(&self, task_id: &str) -> Option<&TaskLog> {
        self.logs.get(task_id)
    }

    /// Absolute length for a task (0 when nothing was ever appended).
    pub fn len(&self, task_id: &str) -> usize {
        self.logs.get(task_id).map(TaskLog::len).unwrap_or(0)
    }

    /// Seed a task's log from a server replay.
    ///
    /// Only applies when nothing has been observed for the task yet; events
    /// that arrived live before the replay response are never overwritten.
    /// Returns `true` when the replay was applied.
    pub fn backfill(&mut self, task_id: &str, events: Vec<TaskExecutionEvent>) -> bool {
        if self.len(task_id) > 0 || events.is_empty() {
            return false;
        }
        let log = self.logs.entry(task_id.to_string()).or_default();
        log.events = events;
        prune(log, self.high_water, self.retain);
        true
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.logs.keys().map(String::as_str)
    }
}

/// Drop the oldest events once the log is over the high-water mark,
/// keeping the most recent `retain`. Returns how many were dropped.
fn prune(log: &mut TaskLog, high_water: usize, retain: usize) -> usize {
    if log.events.len() <= high_water {
        return 0;
    }
    let excess = log.events.len() - retain;
    log.events.drain(..excess);
    log.base += excess;
    excess
}
