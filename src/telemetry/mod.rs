//! Telemetry and logging infrastructure
//!
//! Provides structured logging with tracing and glitch activity counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{GlitchCounters, GlitchStats};
