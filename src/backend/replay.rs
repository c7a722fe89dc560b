//! Session recordings replayed through the push channel.
//!
//! A recording is a JSON document with the backend's initial state and a
//! timeline of push events. Loading it fills an `InMemoryBackend`; playing
//! it sends each step on the channel at its recorded offset, scaled by a
//! speed factor. Status steps also update the backend's stored task so the
//! engine's re-fetch observes the new status.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::memory::InMemoryBackend;
use crate::backend::PushEvent;
use crate::telemetry::types::{DiffResult, TaskExecutionEvent, TaskSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub session_id: String,
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
    /// Events the server already holds when the viewer attaches.
    #[serde(default)]
    pub backfill: HashMap<String, Vec<TaskExecutionEvent>>,
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub diffs: HashMap<String, DiffResult>,
    #[serde(default)]
    pub timeline: Vec<TimelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStep {
    /// Offset from the start of playback.
    pub at_ms: u64,
    pub event: PushEvent,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid recording {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(raw)?;
        recording.validate()?;
        Ok(recording)
    }

    fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            bail!("session_id must not be empty");
        }
        if let Some(pair) = self.timeline.windows(2).find(|w| w[1].at_ms < w[0].at_ms) {
            bail!(
                "timeline is not ordered: step at {}ms follows step at {}ms",
                pair[1].at_ms,
                pair[0].at_ms
            );
        }
        Ok(())
    }

    /// Total playback length at speed 1.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.timeline.last().map(|s| s.at_ms).unwrap_or(0))
    }

    /// Backend holding the recording's initial state.
    pub fn backend(&self) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        for task in &self.tasks {
            backend.upsert_task(task.clone());
        }
        for events in self.backfill.values() {
            for event in events {
                backend.record_stream_event(event.clone());
            }
        }
        for (path, content) in &self.files {
            backend.set_file(path.clone(), content.clone());
        }
        for (task_id, diff) in &self.diffs {
            backend.set_diff(task_id, diff.clone());
        }
        backend
    }
}

/// Send the timeline on `tx`, keeping `backend` in step with it.
///
/// `speed` above 1 plays faster; 0 or less sends everything immediately.
/// Returns the number of steps sent, or an error when a step's scaled
/// offset cannot be scheduled.
pub async fn play(
    recording: &Recording,
    backend: &InMemoryBackend,
    tx: mpsc::UnboundedSender<PushEvent>,
    speed: f64,
    cancel: CancellationToken,
) -> Result<usize> {
    if speed.is_nan() {
        bail!("replay speed must be a number");
    }
    let start = tokio::time::Instant::now();
    let mut sent = 0;
    for step in &recording.timeline {
        if speed > 0.0 {
            let offset = step_offset(step.at_ms, speed)?;
            let deadline = start.checked_add(offset).with_context(|| {
                format!("step at {}ms is out of range at speed {speed}", step.at_ms)
            })?;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {}
            }
        } else if cancel.is_cancelled() {
            break;
        }

        match &step.event {
            PushEvent::TaskStream(event) => backend.record_stream_event(event.clone()),
            PushEvent::TaskStatus { task_id, status } => backend.set_status(task_id, *status),
            PushEvent::TaskDiff { task_id, diff } => backend.set_diff(task_id, diff.clone()),
            PushEvent::SessionStatus { .. } => {}
        }
        if tx.send(step.event.clone()).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

/// Wall-clock offset of a step at the given speed.
fn step_offset(at_ms: u64, speed: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(at_ms as f64 / 1000.0 / speed).with_context(|| {
        format!("step at {at_ms}ms cannot be scheduled at speed {speed}")
    })
}
