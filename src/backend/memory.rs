//! In-process backend holding tasks, streams, files and diffs in memory.
//!
//! Drives the `replay` command and the tests. Individual RPCs can be made
//! to fail so error paths can be exercised.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::backend::Backend;
use crate::telemetry::types::{
    DiffResult, FollowUpMode, TaskExecutionEvent, TaskSnapshot, TaskStatus,
};

/// A follow-up as the backend received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFollowUp {
    pub task_id: String,
    pub message: String,
    pub mode: FollowUpMode,
}

/// A diff mutation as the backend received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffCommand {
    AcceptHunk { file: String, hunk: usize },
    RejectHunk { file: String, hunk: usize, reason: String },
    AcceptFile { file: String },
    RejectFile { file: String },
    SaveFile { file: String, content: String },
}

/// RPCs that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rpc {
    ListTasks,
    GetTask,
    StreamEvents,
    SendFollowUp,
    ReadFile,
    DiffCommand,
    GetDiff,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tasks: RefCell<HashMap<String, TaskSnapshot>>,
    streams: RefCell<HashMap<String, Vec<TaskExecutionEvent>>>,
    files: RefCell<HashMap<String, String>>,
    diffs: RefCell<HashMap<String, DiffResult>>,
    follow_ups: RefCell<Vec<ReceivedFollowUp>>,
    diff_commands: RefCell<Vec<(String, DiffCommand)>>,
    failing: RefCell<HashSet<Rpc>>,
    list_calls: Cell<usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_task(&self, snapshot: TaskSnapshot) {
        self.tasks.borrow_mut().insert(snapshot.id.clone(), snapshot);
    }

    /// Change a stored task's status; unknown tasks are created.
    pub fn set_status(&self, task_id: &str, status: TaskStatus) {
        self.tasks
            .borrow_mut()
            .entry(task_id.to_string())
            .and_modify(|t| t.status = status)
            .or_insert_with(|| TaskSnapshot::new(task_id, status));
    }

    pub fn record_stream_event(&self, event: TaskExecutionEvent) {
        self.streams
            .borrow_mut()
            .entry(event.task_id.clone())
            .or_default()
            .push(event);
    }

    pub fn set_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    pub fn set_diff(&self, task_id: &str, diff: DiffResult) {
        self.diffs.borrow_mut().insert(task_id.to_string(), diff);
    }

    pub fn fail(&self, rpc: Rpc) {
        self.failing.borrow_mut().insert(rpc);
    }

    pub fn recover(&self, rpc: Rpc) {
        self.failing.borrow_mut().remove(&rpc);
    }

    pub fn follow_ups(&self) -> Vec<ReceivedFollowUp> {
        self.follow_ups.borrow().clone()
    }

    pub fn diff_commands(&self) -> Vec<(String, DiffCommand)> {
        self.diff_commands.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    fn check(&self, rpc: Rpc) -> Result<()> {
        if self.failing.borrow().contains(&rpc) {
            bail!("backend unavailable ({rpc:?})");
        }
        Ok(())
    }

    fn mutate_diff(
        &self,
        task_id: &str,
        command: DiffCommand,
        apply: impl FnOnce(&mut DiffResult) -> Result<()>,
    ) -> Result<()> {
        self.check(Rpc::DiffCommand)?;
        let mut diffs = self.diffs.borrow_mut();
        let diff = diffs
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("no diff for task {task_id}"))?;
        apply(diff)?;
        self.diff_commands
            .borrow_mut()
            .push((task_id.to_string(), command));
        Ok(())
    }
}

fn file_position(diff: &DiffResult, path: &str) -> Result<usize> {
    diff.files
        .iter()
        .position(|f| f.path == path)
        .ok_or_else(|| anyhow!("file {path} is not part of the diff"))
}

fn remove_hunk(diff: &mut DiffResult, path: &str, hunk: usize) -> Result<()> {
    let pos = file_position(diff, path)?;
    let file = &mut diff.files[pos];
    if hunk >= file.hunks.len() {
        bail!("hunk {hunk} out of range for {path}");
    }
    file.hunks.remove(hunk);
    if file.hunks.is_empty() {
        diff.files.remove(pos);
    }
    Ok(())
}

#[async_trait(?Send)]
impl Backend for InMemoryBackend {
    async fn list_tasks(&self, _session_id: &str) -> Result<Vec<TaskSnapshot>> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.check(Rpc::ListTasks)?;
        let mut tasks: Vec<TaskSnapshot> = self.tasks.borrow().values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.check(Rpc::GetTask)?;
        self.tasks
            .borrow()
            .get(task_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown task {task_id}"))
    }

    async fn get_session_stream_events(
        &self,
        _session_id: &str,
    ) -> Result<HashMap<String, Vec<TaskExecutionEvent>>> {
        self.check(Rpc::StreamEvents)?;
        Ok(self.streams.borrow().clone())
    }

    async fn send_follow_up(
        &self,
        task_id: &str,
        message: &str,
        mode: FollowUpMode,
    ) -> Result<()> {
        self.check(Rpc::SendFollowUp)?;
        self.follow_ups.borrow_mut().push(ReceivedFollowUp {
            task_id: task_id.to_string(),
            message: message.to_string(),
            mode,
        });
        Ok(())
    }

    async fn read_project_file(&self, _task_id: &str, path: &str) -> Result<String> {
        self.check(Rpc::ReadFile)?;
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }

    async fn accept_hunk(&self, task_id: &str, file_path: &str, hunk_index: usize) -> Result<()> {
        let command = DiffCommand::AcceptHunk {
            file: file_path.to_string(),
            hunk: hunk_index,
        };
        self.mutate_diff(task_id, command, |diff| {
            remove_hunk(diff, file_path, hunk_index)
        })
    }

    async fn reject_hunk(
        &self,
        task_id: &str,
        file_path: &str,
        hunk_index: usize,
        reason: &str,
    ) -> Result<()> {
        let command = DiffCommand::RejectHunk {
            file: file_path.to_string(),
            hunk: hunk_index,
            reason: reason.to_string(),
        };
        self.mutate_diff(task_id, command, |diff| {
            remove_hunk(diff, file_path, hunk_index)
        })
    }

    async fn accept_file(&self, task_id: &str, file_path: &str) -> Result<()> {
        let command = DiffCommand::AcceptFile {
            file: file_path.to_string(),
        };
        self.mutate_diff(task_id, command, |diff| {
            let pos = file_position(diff, file_path)?;
            diff.files.remove(pos);
            Ok(())
        })
    }

    async fn reject_file(&self, task_id: &str, file_path: &str) -> Result<()> {
        let command = DiffCommand::RejectFile {
            file: file_path.to_string(),
        };
        self.mutate_diff(task_id, command, |diff| {
            let pos = file_position(diff, file_path)?;
            diff.files.remove(pos);
            Ok(())
        })
    }

    async fn save_workspace_file(
        &self,
        task_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<()> {
        self.check(Rpc::DiffCommand)?;
        self.files
            .borrow_mut()
            .insert(file_path.to_string(), content.to_string());
        self.diff_commands.borrow_mut().push((
            task_id.to_string(),
            DiffCommand::SaveFile {
                file: file_path.to_string(),
                content: content.to_string(),
            },
        ));
        Ok(())
    }

    async fn get_task_diff(&self, task_id: &str) -> Result<DiffResult> {
        self.check(Rpc::GetDiff)?;
        Ok(self.diffs.borrow().get(task_id).cloned().unwrap_or_default())
    }
}
