//! Per-task chat message lists.

use std::collections::HashMap;

use chrono::Utc;

use crate::telemetry::ids::generate_message_id;
use crate::telemetry::types::{ChatKind, ChatMessage, ChatRole};

#[derive(Debug, Default)]
struct TaskChat {
    messages: Vec<ChatMessage>,
    /// Bumped on every clear so cached feeds keyed on length stay honest.
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ChatLog {
    chats: HashMap<String, TaskChat>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task_id: &str, message: ChatMessage) {
        self.chats
            .entry(task_id.to_string())
            .or_default()
            .messages
            .push(message);
    }

    pub fn messages(&self, task_id: &str) -> &[ChatMessage] {
        self.chats
            .get(task_id)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn generation(&self, task_id: &str) -> u64 {
        self.chats.get(task_id).map(|c| c.generation).unwrap_or(0)
    }

    /// Drop every message for a task.
    pub fn clear(&mut self, task_id: &str) {
        if let Some(chat) = self.chats.get_mut(task_id) {
            chat.messages.clear();
            chat.generation += 1;
        }
    }
}

/// Build a message stamped now with a fresh ID.
pub fn new_message(
    role: ChatRole,
    kind: Option<ChatKind>,
    content: impl Into<String>,
    attachments: Vec<String>,
    log_index: Option<usize>,
) -> ChatMessage {
    ChatMessage {
        id: generate_message_id(),
        role,
        content: content.into(),
        kind,
        timestamp: Utc::now(),
        attachments,
        log_index,
    }
}

/// System error message, anchored at the end of the current log.
pub fn system_error(content: impl Into<String>, log_index: usize) -> ChatMessage {
    new_message(
        ChatRole::System,
        Some(ChatKind::Error),
        content,
        Vec::new(),
        Some(log_index),
    )
}
