//! Data model shared by the telemetry engine, the backend seam and the UI.
//!
//! Wire names follow the backend's JSON payloads (snake_case fields,
//! lowercase enum tags), so every type here derives serde.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a streamed execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Init,
    Text,
    ToolUse,
    ToolResult,
    Result,
    Error,
    Done,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::Init => "init",
            EventKind::Text => "text",
            EventKind::ToolUse => "tool_use",
            EventKind::ToolResult => "tool_result",
            EventKind::Result => "result",
            EventKind::Error => "error",
            EventKind::Done => "done",
        };
        f.write_str(label)
    }
}

/// One unit of streamed telemetry. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionEvent {
    pub task_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TaskExecutionEvent {
    pub fn new(task_id: impl Into<String>, kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            content: content.into(),
            data: None,
        }
    }

    /// Split `"[ToolName] body"` content into `(Some("ToolName"), "body")`.
    ///
    /// Content without a leading bracketed label comes back unchanged with
    /// no label.
    pub fn tool_label(&self) -> (Option<&str>, &str) {
        let content = self.content.as_str();
        if let Some(rest) = content.strip_prefix('[') {
            if let Some(end) = rest.find(']') {
                let name = &rest[..end];
                if !name.is_empty() && !name.contains('\n') {
                    return (Some(name), rest[end + 1..].trim_start());
                }
            }
        }
        (None, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Optional classification of a chat message (currently only errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Error,
    Notice,
}

/// A user- or system-originated message attached to a task's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChatKind>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Absolute event-log length when the message was created; `None`
    /// renders after every current log event.
    #[serde(default)]
    pub log_index: Option<usize>,
}

/// Coarse task lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    AwaitingReview,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// `true` while the backend is still working on the task.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Queued)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::AwaitingReview => "awaiting_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Outcome of a test or build step run by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
}

/// Authoritative coarse-grained state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_result: Option<CheckResult>,
    #[serde(default)]
    pub files_changed: u32,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
}

impl TaskSnapshot {
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            status,
            error: None,
            test_result: None,
            build_result: None,
            files_changed: 0,
            additions: 0,
            deletions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A contiguous block of changed lines within one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// Unified-diff body lines, each prefixed with ` `, `+` or `-`.
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub change: FileChangeKind,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
}

impl FileDiff {
    pub fn additions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.starts_with('+'))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.starts_with('-'))
            .count()
    }
}

/// Latest known set of file-level changes for a task. Replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    #[serde(default)]
    pub files: Vec<FileDiff>,
}

impl DiffResult {
    pub fn files_changed(&self) -> usize {
        self.files.len()
    }

    pub fn additions(&self) -> usize {
        self.files.iter().map(FileDiff::additions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.files.iter().map(FileDiff::deletions).sum()
    }

    /// One-line summary such as `3 files +12 -4`.
    pub fn summary(&self) -> String {
        let n = self.files_changed();
        let noun = if n == 1 { "file" } else { "files" };
        format!("{n} {noun} +{} -{}", self.additions(), self.deletions())
    }
}

/// How the backend should treat a follow-up message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpMode {
    /// Continue working on the task with the new instruction.
    #[default]
    Execute,
    /// Answer with a plan only; make no changes.
    Plan,
}

impl fmt::Display for FollowUpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowUpMode::Execute => f.write_str("execute"),
            FollowUpMode::Plan => f.write_str("plan"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_label_extracts_bracketed_name() {
        let event = TaskExecutionEvent::new("t-1", EventKind::ToolUse, "[Bash] cargo fmt");
        assert_eq!(event.tool_label(), (Some("Bash"), "cargo fmt"));
    }

    #[test]
    fn tool_label_leaves_plain_content_alone() {
        let event = TaskExecutionEvent::new("t-1", EventKind::Text, "no label [here]");
        assert_eq!(event.tool_label(), (None, "no label [here]"));

        let empty = TaskExecutionEvent::new("t-1", EventKind::Text, "[] body");
        assert_eq!(empty.tool_label(), (None, "[] body"));
    }

    #[test]
    fn active_statuses() {
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::Queued.is_active());
        assert!(!TaskStatus::AwaitingReview.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(!TaskStatus::Failed.is_active());
    }

    #[test]
    fn event_deserializes_from_wire_shape() {
        let raw = r#"{"task_id":"t-9","kind":"tool_result","content":"ok"}"#;
        let event: TaskExecutionEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::ToolResult);
        assert!(event.data.is_none());
    }

    #[test]
    fn diff_summary_counts_lines() {
        let diff = DiffResult {
            files: vec![FileDiff {
                path: "src/lib.rs".to_string(),
                change: FileChangeKind::Modified,
                hunks: vec![DiffHunk {
                    old_start: 1,
                    old_lines: 2,
                    new_start: 1,
                    new_lines: 3,
                    lines: vec![
                        " fn a() {}".to_string(),
                        "-fn b() {}".to_string(),
                        "+fn b() -> u8 { 1 }".to_string(),
                        "+fn c() {}".to_string(),
                    ],
                }],
            }],
        };
        assert_eq!(diff.summary(), "1 file +2 -1");
    }
}
