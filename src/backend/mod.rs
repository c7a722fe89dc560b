//! Seam to the automation backend: RPCs and push-channel payloads.
//!
//! Everything here runs on a single thread inside a `tokio::task::LocalSet`,
//! so the trait is `?Send` and implementations may use `RefCell` freely.

pub mod memory;
pub mod replay;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::telemetry::types::{
    DiffResult, FollowUpMode, TaskExecutionEvent, TaskSnapshot, TaskStatus,
};

/// Notification delivered by the backend's push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "task:stream")]
    TaskStream(TaskExecutionEvent),
    #[serde(rename = "task:status")]
    TaskStatus { task_id: String, status: TaskStatus },
    #[serde(rename = "task:diff")]
    TaskDiff { task_id: String, diff: DiffResult },
    #[serde(rename = "session:status")]
    SessionStatus { session_id: String },
}

impl PushEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            PushEvent::TaskStream(event) => Some(&event.task_id),
            PushEvent::TaskStatus { task_id, .. } | PushEvent::TaskDiff { task_id, .. } => {
                Some(task_id)
            }
            PushEvent::SessionStatus { .. } => None,
        }
    }
}

/// Backend RPCs the telemetry engine depends on.
#[async_trait(?Send)]
pub trait Backend {
    async fn list_tasks(&self, session_id: &str) -> Result<Vec<TaskSnapshot>>;

    async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot>;

    /// Replay of every task's stream so far, used once on attach.
    async fn get_session_stream_events(
        &self,
        session_id: &str,
    ) -> Result<HashMap<String, Vec<TaskExecutionEvent>>>;

    async fn send_follow_up(&self, task_id: &str, message: &str, mode: FollowUpMode)
        -> Result<()>;

    async fn read_project_file(&self, task_id: &str, path: &str) -> Result<String>;

    async fn accept_hunk(&self, task_id: &str, file_path: &str, hunk_index: usize) -> Result<()>;

    async fn reject_hunk(
        &self,
        task_id: &str,
        file_path: &str,
        hunk_index: usize,
        reason: &str,
    ) -> Result<()>;

    async fn accept_file(&self, task_id: &str, file_path: &str) -> Result<()>;

    async fn reject_file(&self, task_id: &str, file_path: &str) -> Result<()>;

    async fn save_workspace_file(&self, task_id: &str, file_path: &str, content: &str)
        -> Result<()>;

    async fn get_task_diff(&self, task_id: &str) -> Result<DiffResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::EventKind;

    #[test]
    fn push_events_use_channel_names() {
        let raw = r#"{"type":"task:status","task_id":"t-1","status":"completed"}"#;
        let event: PushEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            PushEvent::TaskStatus {
                task_id: "t-1".to_string(),
                status: TaskStatus::Completed
            }
        );

        let raw = r#"{"type":"task:stream","task_id":"t-2","kind":"text","content":"hi"}"#;
        let event: PushEvent = serde_json::from_str(raw).unwrap();
        match &event {
            PushEvent::TaskStream(e) => assert_eq!(e.kind, EventKind::Text),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(event.task_id(), Some("t-2"));
    }

    #[test]
    fn session_status_has_no_task() {
        let raw = r#"{"type":"session:status","session_id":"s-1"}"#;
        let event: PushEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.task_id(), None);
    }
}
