//! Color and style tokens for the ratatui dashboard.
//!
//! Uses explicit foreground + background pairs so the UI is readable
//! regardless of the user's terminal theme (light or dark).

use ratatui::style::{Color, Modifier, Style};

use crate::telemetry::types::{ChatKind, ChatRole, EventKind, TaskStatus};

/// Dark base background used for all panels.
const BG: Color = Color::Black;

pub fn border() -> Style {
    Style::default().fg(Color::DarkGray).bg(BG)
}

pub fn title() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .bg(BG)
        .add_modifier(Modifier::BOLD)
}

pub fn subdued() -> Style {
    Style::default().fg(Color::Rgb(180, 180, 180)).bg(BG)
}

pub fn selected() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

/// Affordance shown when new items arrived below the viewport.
pub fn new_items() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

pub fn event(kind: EventKind) -> Style {
    let base = Style::default().bg(BG);
    match kind {
        EventKind::Init => base.fg(Color::DarkGray),
        EventKind::Text => base.fg(Color::White),
        EventKind::ToolUse => base.fg(Color::Cyan),
        EventKind::ToolResult => base.fg(Color::Rgb(150, 150, 150)),
        EventKind::Result => base.fg(Color::Green),
        EventKind::Error => base.fg(Color::Red).add_modifier(Modifier::BOLD),
        EventKind::Done => base.fg(Color::Green).add_modifier(Modifier::BOLD),
    }
}

pub fn chat(role: ChatRole, kind: Option<ChatKind>) -> Style {
    let base = Style::default().bg(BG);
    match (role, kind) {
        (_, Some(ChatKind::Error)) => base.fg(Color::Red).add_modifier(Modifier::BOLD),
        (ChatRole::System, _) => base.fg(Color::Yellow),
        _ => base.fg(Color::Magenta).add_modifier(Modifier::BOLD),
    }
}

pub fn status(status: TaskStatus) -> Style {
    let base = Style::default().bg(BG);
    match status {
        TaskStatus::Completed => base.fg(Color::Green),
        TaskStatus::Failed | TaskStatus::Cancelled => base.fg(Color::Red),
        TaskStatus::Running | TaskStatus::Queued => base.fg(Color::Cyan),
        TaskStatus::AwaitingReview => base.fg(Color::Yellow),
        TaskStatus::Pending => base.fg(Color::DarkGray),
    }
}
