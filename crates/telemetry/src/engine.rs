//! Thread-safe telemetry engine: collects turn traces and serves reports.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;
use waypoint_config::TelemetryConfig;

use crate::model::*;
use crate::TelemetryError;

/// Keeps the most recent `max_traces` turn traces.
pub struct TelemetryEngine {
    /// Most recent last.
    traces: RwLock<Vec<Trace>>,
    max_traces: usize,
}

impl TelemetryEngine {
    pub fn new(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            max_traces: max_traces.max(1),
        }
    }

    /// `None` when telemetry is disabled.
    pub fn from_config(config: &TelemetryConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config.max_traces))
    }

    pub fn max_traces(&self) -> usize {
        self.max_traces
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a trace for one turn and return its id.
    pub fn start_trace(&self, thread_id: impl Into<String>) -> String {
        let trace = Trace::new(thread_id);
        let id = trace.id.clone();
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);

        if traces.len() >= self.max_traces {
            // Oldest completed traces go first; open ones are kept.
            let excess = traces.len() + 1 - self.max_traces;
            let mut removed = 0;
            traces.retain(|t| {
                if removed < excess && t.ended_at.is_some() {
                    removed += 1;
                    return false;
                }
                true
            });
        }

        traces.push(trace);
        id
    }

    pub fn record_span(&self, trace_id: &str, span: Span) -> Result<(), TelemetryError> {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        trace.add_span(span);
        Ok(())
    }

    pub fn end_trace(&self, trace_id: &str, outcome: &str) -> Result<(), TelemetryError> {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        let trace = traces
            .iter_mut()
            .find(|t| t.id == trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        trace.end(outcome);
        debug!(
            trace = trace_id,
            thread = %trace.thread_id,
            outcome,
            nodes = ?trace.node_path(),
            "Trace closed"
        );
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().find(|t| t.id == trace_id).cloned()
    }

    /// Most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().rev().take(limit).cloned().collect()
    }

    pub fn traces_for_thread(&self, thread_id: &str) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces
            .iter()
            .filter(|t| t.thread_id == thread_id)
            .cloned()
            .collect()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Fold every retained trace into a summary report.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = TelemetrySnapshot {
            trace_count: traces.len() as u64,
            ..Default::default()
        };

        for trace in traces.iter() {
            if let Some(outcome) = &trace.outcome {
                *snapshot.outcomes.entry(outcome.clone()).or_default() += 1;
            }
            for span in &trace.spans {
                match span.kind {
                    SpanKind::Node => snapshot.nodes.entry(span.label.clone()).or_default().record(span),
                    SpanKind::ToolCall => snapshot.tools.entry(span.label.clone()).or_default().record(span),
                    SpanKind::RuleCheck => {
                        let verdict = span
                            .metadata
                            .get("verdict")
                            .and_then(|v| v.as_str())
                            .unwrap_or("PASS");
                        *snapshot
                            .verdicts
                            .entry(format!("{}:{verdict}", span.label))
                            .or_default() += 1;
                    }
                    SpanKind::RouterDecision => {
                        *snapshot.routes.entry(span.label.clone()).or_default() += 1;
                    }
                    SpanKind::Turn => {}
                }
            }
        }
        snapshot
    }

    /// Pretty JSON of one trace.
    pub fn export_json(&self, trace_id: &str) -> Result<String, TelemetryError> {
        let trace = self
            .get_trace(trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        Ok(serde_json::to_string_pretty(&trace)?)
    }

    /// Drop traces that started before `cutoff`. Returns how many went.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        let before = traces.len();
        traces.retain(|t| t.started_at >= cutoff);
        before - traces.len()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new(TelemetryConfig::default().max_traces)
    }
}
