//! Latest file-diff result per task, refreshed after every mutation.
//!
//! The backend owns the diff. Every accept/reject/save goes to the backend
//! first and is followed by a full re-fetch that replaces the cached value;
//! hunk indices can shift after any change, so nothing is patched locally.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use crate::telemetry::types::DiffResult;
use crate::telemetry::TelemetryEngine;

#[derive(Debug, Default)]
pub struct DiffCache {
    diffs: HashMap<String, DiffResult>,
}

impl DiffCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&DiffResult> {
        self.diffs.get(task_id)
    }

    pub fn replace(&mut self, task_id: &str, diff: DiffResult) {
        self.diffs.insert(task_id.to_string(), diff);
    }
}

impl TelemetryEngine {
    /// Re-fetch a task's diff and replace the cached value.
    pub async fn refresh_diff(&self, task_id: &str) -> Result<DiffResult> {
        let diff = self
            .backend()
            .get_task_diff(task_id)
            .await
            .with_context(|| format!("fetching diff for {task_id}"))?;
        debug!(task_id, summary = %diff.summary(), "diff refreshed");
        self.diffs().borrow_mut().replace(task_id, diff.clone());
        Ok(diff)
    }

    pub async fn accept_hunk(&self, task_id: &str, file_path: &str, hunk_index: usize) -> Result<DiffResult> {
        self.backend()
            .accept_hunk(task_id, file_path, hunk_index)
            .await
            .with_context(|| format!("accepting hunk {hunk_index} of {file_path}"))?;
        self.refresh_diff(task_id).await
    }

    /// Reject a hunk; `reason` is passed to the backend as context.
    pub async fn reject_hunk(
        &self,
        task_id: &str,
        file_path: &str,
        hunk_index: usize,
        reason: &str,
    ) -> Result<DiffResult> {
        self.backend()
            .reject_hunk(task_id, file_path, hunk_index, reason)
            .await
            .with_context(|| format!("rejecting hunk {hunk_index} of {file_path}"))?;
        self.refresh_diff(task_id).await
    }

    pub async fn accept_file(&self, task_id: &str, file_path: &str) -> Result<DiffResult> {
        self.backend()
            .accept_file(task_id, file_path)
            .await
            .with_context(|| format!("accepting {file_path}"))?;
        self.refresh_diff(task_id).await
    }

    pub async fn reject_file(&self, task_id: &str, file_path: &str) -> Result<DiffResult> {
        self.backend()
            .reject_file(task_id, file_path)
            .await
            .with_context(|| format!("rejecting {file_path}"))?;
        self.refresh_diff(task_id).await
    }

    /// Save edited file content into the task's workspace.
    pub async fn save_file(&self, task_id: &str, file_path: &str, content: &str) -> Result<DiffResult> {
        self.backend()
            .save_workspace_file(task_id, file_path, content)
            .await
            .with_context(|| format!("saving {file_path}"))?;
        self.refresh_diff(task_id).await
    }
}
