//! tasklens library: the telemetry engine and its backend seam, exposed so
//! the binary and the integration tests in `tests/` share one build.

pub mod backend;
pub mod cli;
pub mod config;
pub mod output;
pub mod telemetry;
pub mod ui;
