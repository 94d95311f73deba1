//! Turn tracing for Waypoint.
//!
//! Every turn becomes a [`Trace`]: one span per executed node, one per tool
//! call, the router's decision and every rule check. The engine keeps a
//! bounded history and folds it into a [`TelemetrySnapshot`] report.

pub mod engine;
pub mod model;

pub use engine::TelemetryEngine;
pub use model::{NodeStats, Span, SpanKind, TelemetrySnapshot, Trace};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
