//! Session engine for retrocast.
//!
//! This crate owns the session registry, runs one capture loop thread per
//! running session, routes viewer input into the cores and collects
//! per-session metrics.

mod capture;
mod error;
mod input;
mod metrics;
mod orchestrator;
mod state;

pub use error::EngineError;
pub use input::{InputRouter, RouteOutcome};
pub use metrics::MetricsCollector;
pub use orchestrator::{CoreFactory, Engine};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Interval between capture loop stats log lines.
pub const STATS_LOG_INTERVAL_SECS: u64 = 5;
