//! Plain-text rendering of task feeds with ANSI colors.

use colored::Colorize;

use crate::telemetry::interleave::FeedItem;
use crate::telemetry::types::{ChatKind, ChatMessage, ChatRole, EventKind, TaskExecutionEvent, TaskSnapshot, TaskStatus};
use crate::telemetry::TelemetryEngine;

/// Longest content shown per feed line before truncation.
const MAX_LINE_CHARS: usize = 160;

/// Truncate to the first line and at most `max_chars` characters.
pub fn truncate_to_line(s: &str, max_chars: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

/// Uncolored text of one feed item, as shown in the TUI.
pub fn item_text(item: &FeedItem<'_>) -> String {
    match item {
        FeedItem::Log { event, .. } => event_text(event),
        FeedItem::Chat(msg) => chat_text(msg),
    }
}

pub fn event_text(event: &TaskExecutionEvent) -> String {
    match event.tool_label() {
        (Some(tool), body) => format!("{tool} -> {body}"),
        (None, body) => body.to_string(),
    }
}

pub fn chat_text(msg: &ChatMessage) -> String {
    let who = match msg.role {
        ChatRole::User => "you",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "system",
    };
    if msg.attachments.is_empty() {
        format!("{who}: {}", msg.content)
    } else {
        format!("{who}: {} [{}]", msg.content, msg.attachments.join(", "))
    }
}

fn format_event_line(index: usize, event: &TaskExecutionEvent) -> String {
    let text = truncate_to_line(&event_text(event), MAX_LINE_CHARS);
    let prefix = format!("{index:>5}").dimmed();
    let body = match event.kind {
        EventKind::Init => text.dimmed(),
        EventKind::Text => text.normal(),
        EventKind::ToolUse => text.cyan(),
        EventKind::ToolResult => text.bright_black(),
        EventKind::Result => text.green(),
        EventKind::Error => text.red(),
        EventKind::Done => text.green().bold(),
    };
    format!("{prefix} {body}")
}

fn format_chat_line(msg: &ChatMessage) -> String {
    let text = truncate_to_line(&chat_text(msg), MAX_LINE_CHARS);
    let body = match (msg.role, msg.kind) {
        (_, Some(ChatKind::Error)) => text.red().bold(),
        (ChatRole::System, _) => text.yellow(),
        _ => text.purple().bold(),
    };
    format!("{} {body}", "    >".purple())
}

pub fn format_item(item: &FeedItem<'_>) -> String {
    match item {
        FeedItem::Log { index, event } => format_event_line(*index, event),
        FeedItem::Chat(msg) => format_chat_line(msg),
    }
}

pub fn format_status(status: TaskStatus) -> String {
    let label = status.to_string();
    match status {
        TaskStatus::Completed => label.green().to_string(),
        TaskStatus::Failed | TaskStatus::Cancelled => label.red().to_string(),
        TaskStatus::Running | TaskStatus::Queued => label.cyan().to_string(),
        TaskStatus::AwaitingReview => label.yellow().to_string(),
        TaskStatus::Pending => label.dimmed().to_string(),
    }
}

pub fn format_task_header(snapshot: Option<&TaskSnapshot>, task_id: &str, in_flight: bool) -> String {
    let title = snapshot.map(|s| s.title.as_str()).unwrap_or("");
    let status = snapshot
        .map(|s| format_status(s.status))
        .unwrap_or_else(|| "unknown".dimmed().to_string());
    let mut header = format!("{} {} [{}]", task_id.bold(), title, status);
    if in_flight {
        header.push_str(&format!(" {}", "follow-up pending".yellow()));
    }
    if let Some(error) = snapshot.and_then(|s| s.error.as_deref()) {
        header.push_str(&format!("\n  {}", error.red()));
    }
    header
}

/// Print every task's header, feed and diff summary.
pub fn print_session(engine: &TelemetryEngine) {
    println!("{}", format!("Session {}", engine.session_id()).cyan().bold());
    for task_id in engine.task_ids() {
        let snapshot = engine.snapshot(&task_id);
        println!();
        println!(
            "{}",
            format_task_header(snapshot.as_ref(), &task_id, engine.is_in_flight(&task_id))
        );
        let base = engine.log_base(&task_id);
        if base > 0 {
            println!("{}", format!("  ({base} earlier events pruned)").dimmed());
        }
        engine.with_feed(&task_id, |items| {
            for item in items {
                println!("{}", format_item(item));
            }
        });
        if let Some(diff) = engine.diff(&task_id) {
            println!("{}", format!("  diff: {}", diff.summary()).dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::chat::new_message;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_to_line("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_to_line("a\nb", 10), "a");
    }

    #[test]
    fn tool_events_show_tool_name() {
        let event = TaskExecutionEvent::new("t-1", EventKind::ToolUse, "[Read] src/main.rs");
        assert_eq!(event_text(&event), "Read -> src/main.rs");
    }

    #[test]
    fn chat_text_lists_attachments() {
        let msg = new_message(ChatRole::User, None, "look", vec!["a.rs".to_string()], None);
        assert_eq!(chat_text(&msg), "you: look [a.rs]");
    }
}
