//! Events.
//!
//! Two kinds live here:
//! - [`ProtocolEvent`]: the ordered, client-facing stream of a thread
//!   (`message`, `control`, `status`, `error`), numbered per thread.
//! - [`DomainEvent`]: internal notifications published on the [`EventBus`]
//!   so observers can react without coupling to the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

// ── Protocol events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Control,
    Status,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Control => "control",
            Self::Status => "status",
            Self::Error => "error",
        }
    }
}

/// Structured UI payload kinds carried by `control` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    SelectPlan,
    SelectFlight,
    SelectHotel,
    Confirm,
    Blocked,
    Payment,
    Itinerary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Markdown text.
    pub content: String,
    /// True for incremental pieces of a streamed reply.
    pub is_stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPayload {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub options: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub content: String,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// The typed body of a protocol event. Serialized as
/// `{"event_type": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Message(MessagePayload),
    Control(ControlPayload),
    Status(StatusPayload),
    Error(ErrorPayload),
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Message(_) => EventType::Message,
            Self::Control(_) => EventType::Control,
            Self::Status(_) => EventType::Status,
            Self::Error(_) => EventType::Error,
        }
    }
}

/// One event of a thread's outbound stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    #[serde(flatten)]
    pub body: EventBody,
    pub sequence_no: u64,
}

impl ProtocolEvent {
    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }

    pub fn as_message(&self) -> Option<&MessagePayload> {
        match &self.body {
            EventBody::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_control(&self) -> Option<&ControlPayload> {
        match &self.body {
            EventBody::Control(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorPayload> {
        match &self.body {
            EventBody::Error(e) => Some(e),
            _ => None,
        }
    }
}

// ── Domain events ─────────────────────────────────────────────────────────

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn started on a thread
    TurnStarted {
        thread_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A node finished, successfully or not
    NodeCompleted {
        thread_id: String,
        node: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The rule engine objected to a gated transition
    RuleTriggered {
        thread_id: String,
        rule_id: String,
        verdict: String,
        target: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn ended
    TurnFinished {
        thread_id: String,
        outcome: String,
        events_emitted: u64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name used as the SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::NodeCompleted { .. } => "node_completed",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::RuleTriggered { .. } => "rule_triggered",
            Self::TurnFinished { .. } => "turn_finished",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
