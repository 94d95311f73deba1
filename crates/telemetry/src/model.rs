//! Data model for turn traces, spans and the summary report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Top-level turn (inbound message → user-wait).
    Turn,
    /// One node execution.
    Node,
    /// A tool collaborator call.
    ToolCall,
    /// The intent router's classification and chosen target.
    RouterDecision,
    /// One rule's verdict on a gated transition.
    RuleCheck,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::Node => write!(f, "node"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::RouterDecision => write!(f, "router_decision"),
            Self::RuleCheck => write!(f, "rule_check"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Node id, tool name, rule id or routing target.
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
    /// Free-form detail: verdicts, reasons, classifier confidence.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach a metadata field.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mark the span as ended, measuring from `started_at`.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    /// Mark the span as ended with a duration measured elsewhere.
    pub fn finish(mut self, success: bool, duration_ms: u64) -> Self {
        self.ended_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.success = Some(success);
        self
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans of one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub thread_id: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// How the turn ended: `waiting`, `blocked`, `review`, `error`, ...
    pub outcome: Option<String>,
}

impl Trace {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn end(&mut self, outcome: impl Into<String>) {
        self.ended_at = Some(Utc::now());
        self.outcome = Some(outcome.into());
    }

    fn of_kind(&self, kind: SpanKind) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(move |s| s.kind == kind)
    }

    /// Nodes executed in this turn, in order.
    pub fn node_path(&self) -> Vec<&str> {
        self.of_kind(SpanKind::Node).map(|s| s.label.as_str()).collect()
    }

    pub fn tool_call_count(&self) -> usize {
        self.of_kind(SpanKind::ToolCall).count()
    }

    /// Rule checks that did not pass, as `(rule_id, verdict)`.
    pub fn objections(&self) -> Vec<(&str, &str)> {
        self.of_kind(SpanKind::RuleCheck)
            .filter_map(|s| s.meta_str("verdict").map(|v| (s.label.as_str(), v)))
            .filter(|(_, v)| *v != "PASS")
            .collect()
    }

    /// Sum of node durations.
    pub fn total_duration_ms(&self) -> u64 {
        self.of_kind(SpanKind::Node).filter_map(|s| s.duration_ms).sum()
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Per-node (or per-tool) execution statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeStats {
    pub runs: u64,
    pub failures: u64,
    pub total_ms: u64,
}

impl NodeStats {
    pub fn avg_ms(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.runs as f64
        }
    }

    pub(crate) fn record(&mut self, span: &Span) {
        self.runs += 1;
        if span.success == Some(false) {
            self.failures += 1;
        }
        self.total_ms += span.duration_ms.unwrap_or(0);
    }
}

/// Summary report over the retained traces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub trace_count: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub nodes: BTreeMap<String, NodeStats>,
    pub tools: BTreeMap<String, NodeStats>,
    /// Rule check counts keyed by `rule_id:VERDICT`.
    pub verdicts: BTreeMap<String, u64>,
    /// Router targets chosen, by count.
    pub routes: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_lifecycle() {
        let mut span = Span::new(SpanKind::Node, "plan");
        assert!(span.ended_at.is_none());
        span.end(true);
        assert!(span.ended_at.is_some());
        assert_eq!(span.success, Some(true));
        assert!(span.duration_ms.is_some());
    }

    #[test]
    fn span_with_parent_and_meta() {
        let parent = Span::new(SpanKind::Turn, "turn");
        let child = Span::new(SpanKind::RuleCheck, "financial_transaction")
            .with_parent(&parent.id)
            .with_meta("verdict", "REVIEW");
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.meta_str("verdict"), Some("REVIEW"));
    }

    #[test]
    fn trace_views() {
        let mut trace = Trace::new("t1");
        trace.add_span(Span::new(SpanKind::RouterDecision, "collect").finish(true, 0));
        trace.add_span(Span::new(SpanKind::Node, "collect").finish(true, 3));
        trace.add_span(Span::new(SpanKind::ToolCall, "web_search").finish(true, 1));
        trace.add_span(Span::new(SpanKind::Node, "plan").finish(true, 5));
        trace.add_span(
            Span::new(SpanKind::RuleCheck, "pii").with_meta("verdict", "PASS").finish(true, 0),
        );
        trace.add_span(
            Span::new(SpanKind::RuleCheck, "night_curfew")
                .with_meta("verdict", "BLOCK")
                .finish(true, 0),
        );
        trace.end("waiting");

        assert_eq!(trace.node_path(), vec!["collect", "plan"]);
        assert_eq!(trace.tool_call_count(), 1);
        assert_eq!(trace.objections(), vec![("night_curfew", "BLOCK")]);
        assert_eq!(trace.total_duration_ms(), 8);
        assert_eq!(trace.outcome.as_deref(), Some("waiting"));
    }

    #[test]
    fn span_kind_display() {
        assert_eq!(SpanKind::ToolCall.to_string(), "tool_call");
        assert_eq!(SpanKind::RouterDecision.to_string(), "router_decision");
        assert_eq!(SpanKind::RuleCheck.to_string(), "rule_check");
    }

    #[test]
    fn node_stats_average() {
        let mut stats = NodeStats::default();
        assert_eq!(stats.avg_ms(), 0.0);
        stats.record(&Span::new(SpanKind::Node, "plan").finish(true, 4));
        stats.record(&Span::new(SpanKind::Node, "plan").finish(false, 6));
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.avg_ms(), 5.0);
    }
}
