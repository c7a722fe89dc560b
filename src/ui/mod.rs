//! Terminal dashboard for a live session.

pub mod app;
pub mod state;
pub mod theme;
pub mod view;

use std::io::IsTerminal;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::telemetry::TelemetryEngine;
use crate::ui::state::AppState;

fn can_draw(stdout_is_tty: bool, stderr_is_tty: bool) -> bool {
    stdout_is_tty && stderr_is_tty
}

/// Run the dashboard until the user quits or `cancel` fires.
///
/// The dashboard owns the flush tick, so no separate flush ticker should be
/// running for the same engine.
pub async fn run(engine: Rc<TelemetryEngine>, config: &EngineConfig, cancel: CancellationToken) -> Result<()> {
    if !can_draw(std::io::stdout().is_terminal(), std::io::stderr().is_terminal()) {
        bail!("the dashboard needs an interactive terminal; use `tasklens replay` for plain output");
    }
    let state = AppState::new(config.window());
    app::run(engine, state, config.tick(), cancel)
        .await
        .context("terminal UI failed")
}
