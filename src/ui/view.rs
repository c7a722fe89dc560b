//! Rendering functions for the ratatui dashboard.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};

use crate::output::formatter::item_text;
use crate::telemetry::interleave::FeedItem;
use crate::telemetry::types::EventKind;
use crate::telemetry::TelemetryEngine;
use crate::ui::state::AppState;
use crate::ui::theme;

/// Draw one frame of the UI.
pub fn render(frame: &mut Frame<'_>, state: &mut AppState, engine: &TelemetryEngine) {
    // Paint the entire frame black so no terminal background bleeds through.
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, root[0], state, engine);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
        .split(root[1]);
    render_tasks(frame, body[0], state, engine);
    render_feed(frame, body[1], state, engine);

    render_footer(frame, root[2], state);
}

fn render_header(frame: &mut Frame<'_>, area: Rect, state: &AppState, engine: &TelemetryEngine) {
    let mut first = vec![
        Span::styled("tasklens", theme::title()),
        Span::raw("  "),
        Span::styled(format!("session {}", engine.session_id()), theme::subdued()),
    ];
    let mut second = Vec::new();
    if let Some(task_id) = state.selected_task() {
        if let Some(snapshot) = engine.snapshot(task_id) {
            first.push(Span::raw("  "));
            first.push(Span::styled(snapshot.status.to_string(), theme::status(snapshot.status)));
            second.push(Span::styled(
                format!("{task_id} {}", snapshot.title),
                theme::subdued(),
            ));
            if let Some(error) = snapshot.error {
                second.push(Span::raw("  "));
                second.push(Span::styled(error, theme::event(EventKind::Error)));
            }
        }
        if let Some(diff) = engine.diff(task_id) {
            second.push(Span::raw("  "));
            second.push(Span::styled(format!("diff: {}", diff.summary()), theme::subdued()));
        }
        if engine.is_in_flight(task_id) {
            second.push(Span::raw("  "));
            second.push(Span::styled("follow-up pending", theme::new_items()));
        }
    }
    let header = Paragraph::new(vec![Line::from(first), Line::from(second)]).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::TOP)
            .border_style(theme::border()),
    );
    frame.render_widget(header, area);
}

fn render_tasks(frame: &mut Frame<'_>, area: Rect, state: &AppState, engine: &TelemetryEngine) {
    let items: Vec<ListItem<'_>> = state
        .tasks
        .iter()
        .enumerate()
        .map(|(i, task_id)| {
            let marker = if engine.is_in_flight(task_id) { "● " } else { "  " };
            let (status, style) = match engine.snapshot(task_id) {
                Some(s) => (s.status.to_string(), theme::status(s.status)),
                None => ("unknown".to_string(), theme::subdued()),
            };
            let line = Line::from(vec![
                Span::raw(marker),
                Span::raw(format!("{task_id} ")),
                Span::styled(status, style),
            ]);
            if i == state.selected {
                ListItem::new(line).style(theme::selected())
            } else {
                ListItem::new(line)
            }
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title("Tasks")
            .borders(Borders::ALL)
            .border_style(theme::border()),
    );
    frame.render_widget(list, area);
}

/// Split text into display rows of at most `width` characters.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            rows.push(String::new());
            continue;
        }
        for chunk in chars.chunks(width) {
            rows.push(chunk.iter().collect());
        }
    }
    if rows.is_empty() {
        rows.push(String::new());
    }
    rows
}

fn item_style(item: &FeedItem<'_>) -> Style {
    match item {
        FeedItem::Log { event, .. } => theme::event(event.kind),
        FeedItem::Chat(msg) => theme::chat(msg.role, msg.kind),
    }
}

/// Render only the windowed slice of the selected task's feed.
fn render_feed(frame: &mut Frame<'_>, area: Rect, state: &mut AppState, engine: &TelemetryEngine) {
    let block = Block::default().borders(Borders::ALL).border_style(theme::border());
    let Some(task_id) = state.selected_task().map(str::to_string) else {
        frame.render_widget(
            Paragraph::new("No tasks yet").style(theme::subdued()).block(block.title("Feed")),
            area,
        );
        return;
    };

    let inner_height = u64::from(area.height.saturating_sub(2));
    let inner_width = usize::from(area.width.saturating_sub(2)).max(1);
    let log_base = engine.log_base(&task_id);
    let view = state.view_mut(&task_id);

    let lines: Vec<Line<'static>> = engine.with_feed(&task_id, |items| {
        view.sync(items.len(), log_base);
        view.window.set_viewport(inner_height);

        // Measure what is about to be materialized, then window again with
        // the real heights.
        if let Some(range) = view.window.range() {
            for i in range.indices() {
                if let Some(item) = items.get(i) {
                    let rows = wrap(&item_text(item), inner_width).len();
                    view.window.measure(i, rows as u32);
                }
            }
        }
        let Some(range) = view.window.range() else {
            return Vec::new();
        };
        let skip = view.window.scroll_offset().saturating_sub(range.offset_before) as usize;
        items[range.indices()]
            .iter()
            .flat_map(|item| {
                let style = item_style(item);
                wrap(&item_text(item), inner_width)
                    .into_iter()
                    .map(move |row| Line::styled(row, style))
            })
            .skip(skip)
            .take(inner_height as usize)
            .collect()
    });

    let mut title = vec![Span::styled(format!("Feed {task_id}"), theme::title())];
    let unseen = view.window.new_items();
    if unseen > 0 {
        title.push(Span::raw(" "));
        title.push(Span::styled(format!(" ↓ {unseen} new "), theme::new_items()));
    } else if !view.window.is_at_bottom() {
        let max = view.window.total_size().saturating_sub(view.window.viewport());
        title.push(Span::styled(
            format!(" [scroll {}/{}]", view.window.scroll_offset(), max),
            theme::subdued(),
        ));
    }

    frame.render_widget(Paragraph::new(lines).block(block.title(Line::from(title))), area);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, state: &AppState) {
    let (title, body) = match &state.compose {
        Some(compose) => (
            format!("Follow-up ({}): Enter send, Tab mode, Esc cancel", compose.mode),
            Line::from(vec![
                Span::styled("> ", theme::title()),
                Span::raw(compose.text.clone()),
            ]),
        ),
        None => (
            "Keys".to_string(),
            Line::styled(
                "q quit  Tab task  j/k scroll  G bottom  f follow-up  a/r accept/reject file  c clear chat",
                theme::subdued(),
            ),
        ),
    };
    let footer = Paragraph::new(vec![body, Line::styled(state.status_line.clone(), theme::subdued())])
        .block(
            Block::default()
                .title(title)
                .borders(Borders::LEFT | Borders::RIGHT | Borders::TOP)
                .border_style(theme::border()),
        );
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use crate::backend::memory::InMemoryBackend;
    use crate::config::EngineConfig;
    use crate::telemetry::types::TaskExecutionEvent;
    use crate::telemetry::window::WindowConfig;

    #[test]
    fn wrap_splits_long_lines() {
        assert_eq!(wrap("abcdef", 4), vec!["abcd".to_string(), "ef".to_string()]);
        assert_eq!(wrap("", 4), vec![String::new()]);
        assert_eq!(wrap("a\n\nb", 4).len(), 3);
    }

    #[test]
    fn render_materializes_tail_of_long_feed() {
        let engine = TelemetryEngine::new("s-1", Rc::new(InMemoryBackend::new()), &EngineConfig::default());
        for i in 0..300 {
            engine.ingest(TaskExecutionEvent::new("t-1", EventKind::Text, format!("line {i}")));
        }
        engine.flush();

        let mut state = AppState::new(WindowConfig::default());
        state.set_tasks(engine.task_ids());

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal
            .draw(|frame| render(frame, &mut state, &engine))
            .unwrap();

        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("line 299"));
        assert!(!text.contains("line 10 "));
        assert!(state.views.get_mut("t-1").unwrap().window.is_at_bottom());
    }
}
