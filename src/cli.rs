//! CLI argument parsing using clap.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::config::EngineConfig;

/// Live telemetry viewer for autonomous coding tasks.
///
/// tasklens reconciles pushed and polled task state, batches streaming
/// execution events, and shows each task's log interleaved with the
/// follow-up conversation.
#[derive(Parser, Debug)]
#[command(name = "tasklens", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Replay speed multiplier (2.0 plays twice as fast)
    #[arg(long, global = true, value_name = "X", default_value_t = 1.0)]
    pub speed: f64,

    /// Poll interval in milliseconds (overrides config and env)
    #[arg(long, global = true, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Freshness window in milliseconds during which pushed state beats polls
    #[arg(long, global = true, value_name = "MS")]
    pub stale_window_ms: Option<u64>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Play a session recording headless and print every task's feed
    Replay {
        /// Recording file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Play a session recording in the terminal dashboard
    Watch {
        /// Recording file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the resolved configuration
    Config,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Reject flag values clap accepts but playback cannot use.
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() {
            bail!("--speed must be a finite number, got {}", self.speed);
        }
        Ok(())
    }

    /// Apply command-line overrides on top of file and env configuration.
    pub fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(ms) = self.poll_interval_ms {
            config.reconcile.poll_interval_ms = ms;
        }
        if let Some(ms) = self.stale_window_ms {
            config.reconcile.stale_window_ms = ms;
        }
    }
}
