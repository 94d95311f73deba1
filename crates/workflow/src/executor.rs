//! The graph executor.
//!
//! One turn starts at `intent_router` and walks the graph one node at a time
//! until a node waits for the user or the auto-chain limit is reached. Each
//! node works on a copy of the state; the copy replaces the committed state
//! only when the node succeeds and its next hop is legal.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use waypoint_core::state::TurnRole;
use waypoint_core::{ConversationState, DomainEvent, NodeId, NodeResult};
use waypoint_telemetry::{Span, SpanKind, TelemetryEngine};

use crate::emitter::{EventEmitter, NodeSink};
use crate::graph::{Graph, GraphError};
use crate::nodes::{Next, NodeContext, NodeError, NodeRegistry, TurnScratch};
use crate::policy::{StreamMode, StreamPolicy};
use crate::services::Services;
use crate::WorkflowError;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("client disconnected")]
    Cancelled,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("node '{node}' failed internally: {message}")]
    Internal { node: NodeId, message: String },
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Stopped at a node waiting for the user.
    Waiting,
    /// Stopped at `block`.
    Blocked,
    /// Paused by the sentinel for a confirmation.
    Review,
    /// Stopped after `max_auto_chain` hops.
    ChainLimit,
    /// A node failed; an `error` event was sent.
    Failed,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Blocked => "blocked",
            Self::Review => "review",
            Self::ChainLimit => "chain_limit",
            Self::Failed => "error",
        }
    }

    fn at(node: NodeId) -> Self {
        match node {
            NodeId::Block => Self::Blocked,
            NodeId::Sentinel => Self::Review,
            _ => Self::Waiting,
        }
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub results: Vec<NodeResult>,
    pub state: ConversationState,
    pub status: TurnStatus,
    /// Nodes executed, in order.
    pub path: Vec<NodeId>,
}

pub struct GraphExecutor {
    graph: Graph,
    nodes: NodeRegistry,
    services: Arc<Services>,
}

impl GraphExecutor {
    /// The standard graph with the built-in nodes.
    pub fn new(services: Arc<Services>) -> Result<Self, WorkflowError> {
        Self::with_parts(Graph::standard(), NodeRegistry::standard(), services)
    }

    /// Validates the graph and checks every node has an implementation.
    pub fn with_parts(
        graph: Graph,
        nodes: NodeRegistry,
        services: Arc<Services>,
    ) -> Result<Self, WorkflowError> {
        graph.validate()?;
        if let Some(&missing) = nodes.missing().first() {
            return Err(WorkflowError::MissingNode(missing));
        }
        Ok(Self {
            graph,
            nodes,
            services,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Run one turn.
    ///
    /// `Err` means the turn must be rolled back entirely. A failing
    /// collaborator is not an `Err`: the turn ends with an `error` event and
    /// keeps the nodes committed before the failure.
    pub async fn run_turn(
        &self,
        mut state: ConversationState,
        message: &str,
        emitter: &EventEmitter,
    ) -> Result<TurnOutcome, TurnError> {
        let services = &*self.services;
        let max_hops = services.config.executor.max_auto_chain;
        state.push_turn(TurnRole::User, message, None, services.clock.now());

        let mut trace = TraceGuard::start(services.telemetry.clone(), &state.thread_id);
        let mut scratch = TurnScratch {
            trace_id: trace.id.clone(),
            ..TurnScratch::default()
        };
        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut current = NodeId::IntentRouter;
        let mut hops = 0;
        let turn_started = Instant::now();

        let status = loop {
            path.push(current);
            let node = self.nodes.get(current).ok_or_else(|| TurnError::Internal {
                node: current,
                message: "no implementation".into(),
            })?;

            let mut working = state.clone();
            let started = Instant::now();
            let sink = NodeSink::new(current, emitter);
            let mut ctx = NodeContext::new(current, &mut working, message, services, &mut scratch, sink);
            let result = node.run(&mut ctx).await;
            let NodeContext { sink, records, .. } = ctx;
            let duration_ms = started.elapsed().as_millis() as u64;
            results.extend(records);

            let next = match result {
                Ok(next) => next,
                Err(NodeError::Cancelled) => return Err(TurnError::Cancelled),
                Err(NodeError::Internal(message)) => {
                    return Err(TurnError::Internal { node: current, message });
                }
                Err(e) => {
                    drop(sink);
                    warn!(thread = %state.thread_id, node = %current, error = %e, "Node failed");
                    self.node_done(&state, current, false, duration_ms, trace.id.as_deref());
                    emitter.error(e.user_message()).await.map_err(|_| TurnError::Cancelled)?;
                    results.push(NodeResult::error(current, e.to_string()));
                    break TurnStatus::Failed;
                }
            };

            match next {
                Next::Goto(to) => self.graph.check(current, to)?,
                Next::Wait if !self.graph.is_wait(current) => {
                    return Err(GraphError::IllegalWait(current).into());
                }
                Next::Wait => {}
            }

            let transcript = sink.finish().await.map_err(|_| TurnError::Cancelled)?;
            state = working;
            if !transcript.is_empty() {
                let streamed = StreamPolicy::mode(current) == StreamMode::Stream;
                results.push(NodeResult::text(current, transcript.clone(), streamed));
                state.push_turn(TurnRole::Assistant, transcript, Some(current), services.clock.now());
            }
            if current != NodeId::IntentRouter {
                state.current_node = Some(current);
            }
            self.node_done(&state, current, true, duration_ms, trace.id.as_deref());
            debug!(node = %current, next = ?next, duration_ms, "Node committed");

            match next {
                Next::Wait => break TurnStatus::at(current),
                Next::Goto(to) => {
                    hops += 1;
                    if hops > max_hops {
                        warn!(thread = %state.thread_id, node = %current, max_hops, "Auto-chain limit reached");
                        emitter
                            .status("本轮自动步骤已达上限，请继续告诉我下一步。", current)
                            .await
                            .map_err(|_| TurnError::Cancelled)?;
                        break TurnStatus::ChainLimit;
                    }
                    current = to;
                }
            }
        };

        state.event_cursor = emitter.cursor();
        state.updated_at = services.clock.now();

        let elapsed = turn_started.elapsed().as_millis() as u64;
        info!(
            thread = %state.thread_id,
            status = status.as_str(),
            path = ?path,
            duration_ms = elapsed,
            "Turn completed"
        );
        services.record_span(
            trace.id.as_deref(),
            Span::new(SpanKind::Turn, status.as_str())
                .with_meta("nodes", path.len())
                .finish(status != TurnStatus::Failed, elapsed),
        );
        trace.finish(status.as_str());

        Ok(TurnOutcome {
            results,
            state,
            status,
            path,
        })
    }

    fn node_done(
        &self,
        state: &ConversationState,
        node: NodeId,
        success: bool,
        duration_ms: u64,
        trace_id: Option<&str>,
    ) {
        self.services.events.publish(DomainEvent::NodeCompleted {
            thread_id: state.thread_id.clone(),
            node: node.to_string(),
            success,
            duration_ms,
            timestamp: self.services.clock.now(),
        });
        self.services.record_span(
            trace_id,
            Span::new(SpanKind::Node, node.as_str()).finish(success, duration_ms),
        );
    }
}

/// Ends the turn's trace even when the turn future is dropped.
struct TraceGuard {
    engine: Option<Arc<TelemetryEngine>>,
    id: Option<String>,
}

impl TraceGuard {
    fn start(engine: Option<Arc<TelemetryEngine>>, thread_id: &str) -> Self {
        let id = engine.as_ref().map(|e| e.start_trace(thread_id));
        Self { engine, id }
    }

    fn finish(&mut self, outcome: &str) {
        if let (Some(engine), Some(id)) = (&self.engine, self.id.take()) {
            if let Err(e) = engine.end_trace(&id, outcome) {
                debug!(error = %e, "Trace already closed");
            }
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        self.finish("aborted");
    }
}
