//! Engine configuration: `.tasklens.toml` discovery, env overrides, validation.
//!
//! The config file is optional. Discovery walks up from the current
//! directory; when nothing is found every setting takes its default.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::telemetry::window::WindowConfig;

pub const CONFIG_FILE: &str = ".tasklens.toml";

/// Contents of `.tasklens.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// How long a pushed snapshot is protected from poll results.
    #[serde(default = "default_stale_window_ms")]
    pub stale_window_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            stale_window_ms: default_stale_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Per-task event count that triggers a prune.
    #[serde(default = "default_high_water")]
    pub high_water: usize,
    /// Events kept after a prune.
    #[serde(default = "default_retain")]
    pub retain: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            high_water: default_high_water(),
            retain: default_retain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_overscan")]
    pub overscan: usize,
    #[serde(default = "default_stick_threshold")]
    pub stick_threshold: u64,
    /// Render tick; also the notification flush interval.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_estimated_item_size")]
    pub estimated_item_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            overscan: default_overscan(),
            stick_threshold: default_stick_threshold(),
            tick_ms: default_tick_ms(),
            estimated_item_size: default_estimated_item_size(),
        }
    }
}

fn default_stale_window_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_high_water() -> usize {
    500
}

fn default_retain() -> usize {
    400
}

fn default_overscan() -> usize {
    20
}

fn default_stick_threshold() -> u64 {
    2
}

fn default_tick_ms() -> u64 {
    50
}

fn default_estimated_item_size() -> u32 {
    1
}

impl EngineConfig {
    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.reconcile.stale_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile.poll_interval_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.feed.tick_ms)
    }

    pub fn window(&self) -> WindowConfig {
        WindowConfig {
            overscan: self.feed.overscan,
            stick_threshold: self.feed.stick_threshold,
            estimated_item_size: self.feed.estimated_item_size,
        }
    }

    /// Apply `TASKLENS_*` environment overrides. Unparseable values are
    /// ignored.
    pub fn apply_env(&mut self) {
        if let Some(ms) = env_u64("TASKLENS_POLL_INTERVAL_MS") {
            self.reconcile.poll_interval_ms = ms;
        }
        if let Some(ms) = env_u64("TASKLENS_STALE_WINDOW_MS") {
            self.reconcile.stale_window_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log.retain == 0 {
            bail!("[log] retain must be at least 1");
        }
        if self.log.retain > self.log.high_water {
            bail!(
                "[log] retain ({}) must not exceed high_water ({})",
                self.log.retain,
                self.log.high_water
            );
        }
        if self.feed.tick_ms == 0 {
            bail!("[feed] tick_ms must be greater than 0");
        }
        if self.reconcile.poll_interval_ms == 0 {
            bail!("[reconcile] poll_interval_ms must be greater than 0");
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Resolved configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: EngineConfig,
}

/// Discover and load configuration starting from the current directory,
/// then apply environment overrides and validate.
pub fn load() -> Result<LoadedConfig> {
    let cwd = env::current_dir()?;
    let mut loaded = discover_from(&cwd)?;
    loaded.config.apply_env();
    loaded.config.validate()?;
    Ok(loaded)
}

/// Walk up from `start` looking for `.tasklens.toml`.
fn discover_from(start: &Path) -> Result<LoadedConfig> {
    let mut current = start;
    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(LoadedConfig {
                path: Some(config_path),
                config,
            });
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Ok(LoadedConfig {
                    path: None,
                    config: EngineConfig::default(),
                })
            }
        }
    }
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.stale_window(), Duration::from_millis(5000));
        assert_eq!(config.log.high_water, 500);
        assert_eq!(config.log.retain, 400);
        assert_eq!(config.feed.overscan, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str("[reconcile]\nstale_window_ms = 750\n").unwrap();
        assert_eq!(config.reconcile.stale_window_ms, 750);
        assert_eq!(config.reconcile.poll_interval_ms, 2000);
        assert_eq!(config.feed, FeedConfig::default());
    }

    #[test]
    fn discovers_config_in_parent_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[log]\nhigh_water = 50\nretain = 10\n").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let loaded = discover_from(&nested).unwrap();
        assert_eq!(loaded.path, Some(dir.path().join(CONFIG_FILE)));
        assert_eq!(loaded.config.log.high_water, 50);
        assert_eq!(loaded.config.log.retain, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[log\nretain = ").unwrap();
        let err = discover_from(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse"));
    }

    #[test]
    fn validation_rejects_retain_above_high_water() {
        let mut config = EngineConfig::default();
        config.log.retain = 600;
        assert!(config.validate().is_err());
        config.log.retain = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_tick() {
        let mut config = EngineConfig::default();
        config.feed.tick_ms = 0;
        assert!(config.validate().is_err());
    }
}
