//! Follow-up messages sent into a task's conversation.
//!
//! The user's message is recorded in the chat list before the RPC is made
//! and is never retracted, so the feed shows what was attempted even when
//! delivery fails. The in-flight marker set here is cleared by a failed
//! send or, later, by a pushed status leaving running/queued. There is no
//! client-side timeout.

use tracing::{info, warn};

use crate::telemetry::chat::{new_message, system_error};
use crate::telemetry::types::{ChatKind, ChatRole, FollowUpMode};
use crate::telemetry::TelemetryEngine;

/// A resolved attachment ready to be inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: String,
    pub content: String,
}

/// What happened to a follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the backend; completion arrives later via the push channel.
    Delivered,
    /// The backend rejected or never received the message.
    Failed(String),
}

/// Prepend each attachment as a tagged block, then the user's text.
pub fn compose_message(text: &str, attachments: &[Attachment]) -> String {
    let mut out = String::new();
    for attachment in attachments {
        out.push_str(&format!(
            "<file path=\"{}\">\n{}",
            attachment.path, attachment.content
        ));
        if !attachment.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("</file>\n\n");
    }
    out.push_str(text);
    out
}

impl TelemetryEngine {
    /// Send a follow-up for `task_id`.
    ///
    /// Attachments are read through the backend; unreadable ones are left
    /// out and reported as a system notice rather than aborting the send.
    pub async fn send_follow_up(
        &self,
        task_id: &str,
        text: &str,
        mode: FollowUpMode,
        attachments: Vec<String>,
    ) -> SendOutcome {
        let mut resolved = Vec::with_capacity(attachments.len());
        let mut unreadable = Vec::new();
        for path in &attachments {
            match self.backend().read_project_file(task_id, path).await {
                Ok(content) => resolved.push(Attachment {
                    path: path.clone(),
                    content,
                }),
                Err(err) => {
                    warn!(task_id, path = %path, "attachment unreadable: {err:#}");
                    unreadable.push(path.clone());
                }
            }
        }

        let anchor = self.log_len(task_id);
        let attached = resolved.iter().map(|a| a.path.clone()).collect();
        self.push_chat(
            task_id,
            new_message(ChatRole::User, None, text, attached, Some(anchor)),
        );
        if !unreadable.is_empty() {
            self.push_chat(
                task_id,
                new_message(
                    ChatRole::System,
                    Some(ChatKind::Notice),
                    format!("Could not attach: {}", unreadable.join(", ")),
                    Vec::new(),
                    Some(anchor),
                ),
            );
        }
        self.reconciler().borrow_mut().mark_in_flight(task_id);

        let message = compose_message(text, &resolved);
        match self.backend().send_follow_up(task_id, &message, mode).await {
            Ok(()) => {
                info!(task_id, %mode, attachments = resolved.len(), "follow-up sent");
                SendOutcome::Delivered
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(task_id, "follow-up failed: {reason}");
                self.reconciler().borrow_mut().clear_in_flight(task_id);
                self.push_chat(
                    task_id,
                    system_error(
                        format!("Failed to send follow-up: {reason}"),
                        self.log_len(task_id),
                    ),
                );
                SendOutcome::Failed(reason)
            }
        }
    }
}
