//! Terminal output: tracing setup and plain-text feed rendering.

pub mod formatter;
pub mod logger;
