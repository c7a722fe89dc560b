//! Tracing setup and log file location.
//!
//! Headless runs log to stderr. While the TUI owns the terminal, logs go to
//! a timestamped file instead so they don't tear the display.

use anyhow::{Context, Result};
use chrono::Utc;
use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Env var holding the tracing filter directive.
pub const LOG_ENV: &str = "TASKLENS_LOG";

/// Where log output should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns the log file path when logging
/// to a file.
pub fn init(target: LogTarget) -> Result<Option<PathBuf>> {
    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .try_init();
            Ok(None)
        }
        LogTarget::File => {
            let path = setup_log_file()?;
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            Ok(Some(path))
        }
    }
}

/// Create the log directory and return a fresh log file path.
pub fn setup_log_file() -> Result<PathBuf> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    Ok(log_dir.join(format!("{timestamp}.log")))
}

/// Get the log directory path.
pub fn log_directory() -> PathBuf {
    let base_dir = env::var("TMPDIR")
        .or_else(|_| env::var("XDG_RUNTIME_DIR"))
        .unwrap_or_else(|_| "/tmp".to_string());

    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    PathBuf::from(base_dir)
        .join("tasklens")
        .join("logs")
        .join(project_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_namespaced() {
        let dir = log_directory();
        let parts: Vec<String> = dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        let n = parts.len();
        assert_eq!(parts[n - 3], "tasklens");
        assert_eq!(parts[n - 2], "logs");
    }
}
