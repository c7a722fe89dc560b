//! Mutable view state for the TUI renderer.

use std::collections::HashMap;

use crate::telemetry::types::FollowUpMode;
use crate::telemetry::window::{FeedWindow, WindowConfig};

/// Windowing state for one task's feed.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub window: FeedWindow,
    /// Log base seen at the last sync, to detect pruning.
    last_base: usize,
}

impl FeedView {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            window: FeedWindow::new(config),
            last_base: 0,
        }
    }

    /// Bring the window in line with the engine's current feed length.
    pub fn sync(&mut self, feed_len: usize, log_base: usize) {
        let pruned = log_base.saturating_sub(self.last_base);
        self.last_base = log_base;
        if feed_len != self.window.len() || pruned > 0 {
            self.window.sync_len(feed_len, pruned);
        }
    }
}

/// Follow-up being typed in the compose line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose {
    pub text: String,
    pub mode: FollowUpMode,
    /// Paths given with `@path` tokens are sent as attachments.
    pub attachments: Vec<String>,
}

impl Compose {
    /// Split `@path` tokens out of the typed text.
    pub fn finish(&self) -> (String, Vec<String>) {
        let mut attachments = self.attachments.clone();
        let mut words = Vec::new();
        for word in self.text.split_whitespace() {
            match word.strip_prefix('@') {
                Some(path) if !path.is_empty() => attachments.push(path.to_string()),
                _ => words.push(word),
            }
        }
        (words.join(" "), attachments)
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            FollowUpMode::Execute => FollowUpMode::Plan,
            FollowUpMode::Plan => FollowUpMode::Execute,
        };
    }
}

/// Render state for the TUI.
#[derive(Debug, Clone)]
pub struct AppState {
    pub tasks: Vec<String>,
    pub selected: usize,
    pub views: HashMap<String, FeedView>,
    pub compose: Option<Compose>,
    /// Last action result shown in the footer.
    pub status_line: String,
    window_config: WindowConfig,
}

impl AppState {
    pub fn new(window_config: WindowConfig) -> Self {
        Self {
            tasks: Vec::new(),
            selected: 0,
            views: HashMap::new(),
            compose: None,
            status_line: "Attaching...".to_string(),
            window_config,
        }
    }

    pub fn selected_task(&self) -> Option<&str> {
        self.tasks.get(self.selected).map(String::as_str)
    }

    /// Replace the task list, keeping the current selection when possible.
    pub fn set_tasks(&mut self, tasks: Vec<String>) {
        let current = self.selected_task().map(str::to_string);
        self.tasks = tasks;
        self.selected = current
            .and_then(|id| self.tasks.iter().position(|t| *t == id))
            .unwrap_or(0)
            .min(self.tasks.len().saturating_sub(1));
    }

    pub fn select_next(&mut self) {
        if !self.tasks.is_empty() {
            self.selected = (self.selected + 1) % self.tasks.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.tasks.is_empty() {
            self.selected = (self.selected + self.tasks.len() - 1) % self.tasks.len();
        }
    }

    pub fn view_mut(&mut self, task_id: &str) -> &mut FeedView {
        let config = self.window_config;
        self.views
            .entry(task_id.to_string())
            .or_insert_with(|| FeedView::new(config))
    }

    pub fn selected_view_mut(&mut self) -> Option<&mut FeedView> {
        let task = self.selected_task()?.to_string();
        Some(self.view_mut(&task))
    }

    pub fn start_compose(&mut self) {
        if self.selected_task().is_some() {
            self.compose = Some(Compose::default());
        }
    }

    pub fn cancel_compose(&mut self) {
        self.compose = None;
    }
}
