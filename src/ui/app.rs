//! UI runtime loop backed by ratatui + crossterm.
//!
//! Runs on the engine's `LocalSet`: each tick flushes pending log
//! notifications, drains terminal input, then draws. Backend calls started
//! from a key press are spawned as local tasks and report back through the
//! footer status line.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::telemetry::followup::SendOutcome;
use crate::telemetry::types::FollowUpMode;
use crate::telemetry::TelemetryEngine;
use crate::ui::state::AppState;
use crate::ui::view;

/// Rows moved per mouse wheel notch.
const WHEEL_ROWS: i64 = 3;

/// Work a key press asks for beyond local view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Send {
        task_id: String,
        text: String,
        mode: FollowUpMode,
        attachments: Vec<String>,
    },
    AcceptFile(String),
    RejectFile(String),
    ClearChat(String),
}

/// Execute the UI loop until the user quits or `cancel` fires.
pub async fn run(
    engine: Rc<TelemetryEngine>,
    mut state: AppState,
    tick: Duration,
    cancel: CancellationToken,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, Hide)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let status = Rc::new(RefCell::new(String::from("Attached")));
    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        engine.flush();
        state.set_tasks(engine.task_ids());
        state.status_line = status.borrow().clone();

        let mut quit = false;
        for action in handle_terminal_events(&mut state) {
            if action == Action::Quit {
                quit = true;
                break;
            }
            dispatch(&engine, &status, action);
        }
        if quit {
            cancel.cancel();
            break Ok(());
        }

        if state.compose.is_some() {
            let _ = execute!(terminal.backend_mut(), Show);
        } else {
            let _ = execute!(terminal.backend_mut(), Hide);
        }
        if let Err(err) = terminal.draw(|frame| view::render(frame, &mut state, &engine)) {
            break Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(tick) => {}
        }
    };

    let _ = terminal.show_cursor();
    let _ = disable_raw_mode();
    let _ = execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen,
        Show
    );
    result
}

fn handle_terminal_events(state: &mut AppState) -> Vec<Action> {
    // Drain everything available so held keys and wheel bursts cost one redraw.
    let mut actions = Vec::new();
    loop {
        let Ok(has_event) = event::poll(Duration::from_millis(0)) else {
            break;
        };
        if !has_event {
            break;
        }
        let Ok(ev) = event::read() else {
            break;
        };
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                actions.extend(process_key(state, key));
            }
            Event::Mouse(mouse) => {
                let delta = match mouse.kind {
                    MouseEventKind::ScrollUp => -WHEEL_ROWS,
                    MouseEventKind::ScrollDown => WHEEL_ROWS,
                    _ => continue,
                };
                if let Some(view) = state.selected_view_mut() {
                    view.window.scroll_by(delta);
                }
            }
            _ => continue,
        }
    }
    actions
}

/// Apply a key press to view state, returning any backend work it implies.
pub fn process_key(state: &mut AppState, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    if let Some(compose) = state.compose.as_mut() {
        match key.code {
            KeyCode::Esc => state.cancel_compose(),
            KeyCode::Tab => compose.toggle_mode(),
            KeyCode::Backspace => {
                compose.text.pop();
            }
            KeyCode::Enter => {
                let (text, attachments) = compose.finish();
                let mode = compose.mode;
                state.cancel_compose();
                if text.is_empty() && attachments.is_empty() {
                    return None;
                }
                let task_id = state.selected_task()?.to_string();
                return Some(Action::Send {
                    task_id,
                    text,
                    mode,
                    attachments,
                });
            }
            KeyCode::Char(ch) => compose.text.push(ch),
            _ => {}
        }
        return None;
    }

    let page = state
        .selected_view_mut()
        .map(|view| view.window.viewport().max(1) as i64)
        .unwrap_or(1);
    match key.code {
        KeyCode::Char('q') => return Some(Action::Quit),
        KeyCode::Tab => state.select_next(),
        KeyCode::BackTab => state.select_prev(),
        KeyCode::Char('f') => state.start_compose(),
        KeyCode::Char('a') => return state.selected_task().map(|t| Action::AcceptFile(t.to_string())),
        KeyCode::Char('r') => return state.selected_task().map(|t| Action::RejectFile(t.to_string())),
        KeyCode::Char('c') => return state.selected_task().map(|t| Action::ClearChat(t.to_string())),
        code => {
            let Some(view) = state.selected_view_mut() else {
                return None;
            };
            match code {
                KeyCode::Up | KeyCode::Char('k') => view.window.scroll_by(-1),
                KeyCode::Down | KeyCode::Char('j') => view.window.scroll_by(1),
                KeyCode::PageUp => view.window.scroll_by(-page),
                KeyCode::PageDown => view.window.scroll_by(page),
                KeyCode::Home | KeyCode::Char('g') => view.window.scroll_to(0),
                KeyCode::End | KeyCode::Char('G') => view.window.stick_to_bottom(),
                _ => {}
            }
        }
    }
    None
}

fn dispatch(engine: &Rc<TelemetryEngine>, status: &Rc<RefCell<String>>, action: Action) {
    match action {
        Action::Quit => {}
        Action::ClearChat(task_id) => {
            engine.clear_chat(&task_id);
            *status.borrow_mut() = format!("Cleared chat for {task_id}");
        }
        Action::Send {
            task_id,
            text,
            mode,
            attachments,
        } => {
            let engine = Rc::clone(engine);
            let status = Rc::clone(status);
            *status.borrow_mut() = format!("Sending follow-up to {task_id}...");
            tokio::task::spawn_local(async move {
                let line = match engine.send_follow_up(&task_id, &text, mode, attachments).await {
                    SendOutcome::Delivered => format!("Follow-up sent to {task_id} ({mode})"),
                    SendOutcome::Failed(reason) => format!("Follow-up failed: {reason}"),
                };
                *status.borrow_mut() = line;
            });
        }
        Action::AcceptFile(task_id) => review_first_file(engine, status, task_id, true),
        Action::RejectFile(task_id) => review_first_file(engine, status, task_id, false),
    }
}

/// Accept or reject the first file of the task's pending diff.
fn review_first_file(
    engine: &Rc<TelemetryEngine>,
    status: &Rc<RefCell<String>>,
    task_id: String,
    accept: bool,
) {
    let Some(path) = first_diff_file(engine, &task_id) else {
        *status.borrow_mut() = format!("No pending changes for {task_id}");
        return;
    };
    let engine = Rc::clone(engine);
    let status = Rc::clone(status);
    tokio::task::spawn_local(async move {
        let (verb, result) = if accept {
            ("Accepted", engine.accept_file(&task_id, &path).await)
        } else {
            ("Rejected", engine.reject_file(&task_id, &path).await)
        };
        let line = match result {
            Ok(diff) => format!("{verb} {path}; remaining {}", diff.summary()),
            Err(err) => {
                warn!(task_id = %task_id, path = %path, "diff review failed: {err:#}");
                format!("{err:#}")
            }
        };
        *status.borrow_mut() = line;
    });
}

fn first_diff_file(engine: &TelemetryEngine, task_id: &str) -> Option<String> {
    engine
        .diff(task_id)
        .and_then(|diff| diff.files.first().map(|f| f.path.clone()))
}
