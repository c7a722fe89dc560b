//! Push/poll snapshot reconciliation.
//!
//! Polls are complete but slow; pushes are partial but fresh. A push stamps
//! the task with a freshness marker, and any poll result for that task that
//! lands inside `stale_window` of the marker is discarded. This is a
//! last-write-wins policy with a freshness override, not a causal merge.
//!
//! The in-flight follow-up set lives here too, because the only thing that
//! clears it is a pushed status leaving `running`/`queued`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::telemetry::types::TaskSnapshot;

/// Default protection window for push-derived snapshots.
pub const DEFAULT_STALE_WINDOW: Duration = Duration::from_millis(5000);

/// What a poll did to the snapshots it carried.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub applied: Vec<String>,
    /// Tasks whose polled snapshot lost to a fresher push.
    pub discarded: Vec<String>,
}

#[derive(Debug)]
pub struct SnapshotReconciler {
    snapshots: HashMap<String, TaskSnapshot>,
    freshness: HashMap<String, Instant>,
    in_flight: HashSet<String>,
    stale_window: Duration,
}

impl Default for SnapshotReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_WINDOW)
    }
}

impl SnapshotReconciler {
    pub fn new(stale_window: Duration) -> Self {
        Self {
            snapshots: HashMap::new(),
            freshness: HashMap::new(),
            in_flight: HashSet::new(),
            stale_window,
        }
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    pub fn apply_push(&mut self, task_id: &str, snapshot: TaskSnapshot) {
        self.apply_push_at(task_id, snapshot, Instant::now());
    }

    /// Replace the task's snapshot and stamp it fresh as of `now`.
    ///
    /// A status that is no longer running/queued resolves any outstanding
    /// follow-up for the task.
    pub fn apply_push_at(&mut self, task_id: &str, snapshot: TaskSnapshot, now: Instant) {
        if !snapshot.status.is_active() && self.in_flight.remove(task_id) {
            tracing::debug!(task_id, status = %snapshot.status, "follow-up resolved");
        }
        self.snapshots.insert(task_id.to_string(), snapshot);
        self.freshness.insert(task_id.to_string(), now);
    }

    pub fn apply_poll(&mut self, polled: Vec<TaskSnapshot>) -> PollOutcome {
        self.apply_poll_at(polled, Instant::now())
    }

    /// Merge a full poll result, task by task. Tasks missing from the poll
    /// are left untouched.
    pub fn apply_poll_at(&mut self, polled: Vec<TaskSnapshot>, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        for snapshot in polled {
            let task_id = snapshot.id.clone();
            if self.is_fresh(&task_id, now) {
                outcome.discarded.push(task_id);
                continue;
            }
            self.snapshots.insert(task_id.clone(), snapshot);
            outcome.applied.push(task_id);
        }
        outcome
    }

    fn is_fresh(&self, task_id: &str, now: Instant) -> bool {
        self.freshness
            .get(task_id)
            .is_some_and(|pushed| now.saturating_duration_since(*pushed) < self.stale_window)
    }

    pub fn snapshot(&self, task_id: &str) -> Option<&TaskSnapshot> {
        self.snapshots.get(task_id)
    }

    /// All known snapshots, ordered by task id for stable presentation.
    pub fn snapshots(&self) -> Vec<&TaskSnapshot> {
        let mut all: Vec<&TaskSnapshot> = self.snapshots.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn mark_in_flight(&mut self, task_id: &str) {
        self.in_flight.insert(task_id.to_string());
    }

    pub fn clear_in_flight(&mut self, task_id: &str) {
        self.in_flight.remove(task_id);
    }

    pub fn is_in_flight(&self, task_id: &str) -> bool {
        self.in_flight.contains(task_id)
    }
}
