//! tasklens - live telemetry viewer for autonomous coding tasks

use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::{spawn_local, JoinHandle, LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tasklens::backend::memory::InMemoryBackend;
use tasklens::backend::replay::{self, Recording};
use tasklens::cli;
use tasklens::config::{self, EngineConfig};
use tasklens::output::{formatter, logger};
use tasklens::telemetry::TelemetryEngine;
use tasklens::ui;

fn main() -> ExitCode {
    match run() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = cli::Args::parse_args();
    args.validate()?;

    let mut loaded = config::load()?;
    args.apply_overrides(&mut loaded.config);
    loaded.config.validate()?;
    let config = loaded.config;

    match args.command {
        cli::Command::Config => {
            match &loaded.path {
                Some(path) => println!("# {}", path.display()),
                None => println!("# defaults (no {} found)", config::CONFIG_FILE),
            }
            print!(
                "{}",
                toml::to_string(&config).context("Failed to serialize configuration")?
            );
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Replay { file } => {
            logger::init(logger::LogTarget::Stderr)?;
            block_on_local(replay_headless(&file, config, args.speed))?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Watch { file } => {
            let log_path = logger::init(logger::LogTarget::File)?;
            let result = block_on_local(watch(&file, config, args.speed));
            if let Some(path) = log_path {
                eprintln!("Log: {}", path.display());
            }
            result?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run `fut` on a current-thread runtime inside a `LocalSet`.
fn block_on_local<F: std::future::Future<Output = Result<()>>>(fut: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    LocalSet::new().block_on(&runtime, fut)
}

/// Engine wired to a recording's backend, with push and poll loops running.
struct Session {
    recording: Recording,
    backend: Rc<InMemoryBackend>,
    engine: Rc<TelemetryEngine>,
    tx: mpsc::UnboundedSender<tasklens::backend::PushEvent>,
    push: JoinHandle<()>,
    poll: JoinHandle<()>,
}

async fn start_session(file: &Path, config: &EngineConfig, cancel: &CancellationToken) -> Result<Session> {
    let recording = Recording::load(file)?;
    let backend = Rc::new(recording.backend());
    let engine = Rc::new(TelemetryEngine::new(
        recording.session_id.clone(),
        backend.clone(),
        config,
    ));
    info!(
        session = %recording.session_id,
        steps = recording.timeline.len(),
        duration_ms = recording.duration().as_millis() as u64,
        "attaching to recording"
    );
    engine.attach().await;

    let (tx, rx) = mpsc::unbounded_channel();
    let push = spawn_local({
        let engine = Rc::clone(&engine);
        let cancel = cancel.clone();
        async move { engine.run_push_loop(rx, cancel).await }
    });
    let poll = spawn_local({
        let engine = Rc::clone(&engine);
        let cancel = cancel.clone();
        let interval = config.poll_interval();
        async move { engine.run_poll_loop(interval, cancel).await }
    });

    Ok(Session {
        recording,
        backend,
        engine,
        tx,
        push,
        poll,
    })
}

async fn replay_headless(file: &Path, config: EngineConfig, speed: f64) -> Result<()> {
    let cancel = CancellationToken::new();
    let session = start_session(file, &config, &cancel).await?;
    let ticker = spawn_local({
        let engine = Rc::clone(&session.engine);
        let cancel = cancel.clone();
        let tick = config.tick();
        async move { engine.run_flush_ticker(tick, cancel).await }
    });

    let sent = replay::play(
        &session.recording,
        &session.backend,
        session.tx,
        speed,
        cancel.clone(),
    )
    .await;
    // The sender is gone once playback ends, so the push loop drains and exits.
    session.push.await.context("push loop panicked")?;
    cancel.cancel();
    session.poll.await.context("poll loop panicked")?;
    ticker.await.context("flush ticker panicked")?;
    let sent = sent?;
    info!(steps = sent, "replay finished");

    session.engine.flush();
    formatter::print_session(&session.engine);
    Ok(())
}

async fn watch(file: &Path, config: EngineConfig, speed: f64) -> Result<()> {
    let cancel = CancellationToken::new();
    let session = start_session(file, &config, &cancel).await?;
    let player = spawn_local({
        let recording = session.recording.clone();
        let backend = Rc::clone(&session.backend);
        let tx = session.tx;
        let cancel = cancel.clone();
        async move { replay::play(&recording, &backend, tx, speed, cancel).await }
    });

    let result = ui::run(Rc::clone(&session.engine), &config, cancel.clone()).await;
    cancel.cancel();
    let sent = player.await.context("player panicked")??;
    session.push.await.context("push loop panicked")?;
    session.poll.await.context("poll loop panicked")?;
    info!(steps = sent, "watch finished");
    result
}
