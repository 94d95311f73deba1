//! The node catalog.
//!
//! Every [`NodeId`] has exactly one [`Node`] implementation in the
//! [`NodeRegistry`]. A node runs against a working copy of the conversation
//! state inside a [`NodeContext`] and answers with the next hop: stop and
//! wait for the user, or go to another node. The executor commits the
//! working copy only when the node returns `Ok`.

mod chat;
mod collect;
mod pay;
mod plan;
mod router;
mod search;
mod select;
mod sentinel;
mod summary;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use thiserror::Error;
use waypoint_core::error::{ProviderError, StateError, ToolError};
use waypoint_core::generator::split_increments;
use waypoint_core::{ControlKind, ConversationState, Leg, NodeId, NodeResult};
use waypoint_rules::RuleDecision;
use waypoint_telemetry::{Span, SpanKind};

use crate::emitter::{Disconnected, NodeSink};
use crate::policy::StreamMode;
use crate::services::Services;

pub use chat::{CheckWeatherNode, GuideNode, SideChatNode};
pub use collect::CollectNode;
pub use pay::PayNode;
pub use plan::PlanNode;
pub use router::IntentRouterNode;
pub use search::SearchNode;
pub use select::SelectNode;
pub use sentinel::{BlockNode, SentinelNode};
pub use summary::SummaryNode;

/// What happens after a node completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Stop the turn and wait for the user.
    Wait,
    /// Continue with another node in the same turn.
    Goto(NodeId),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("client disconnected")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Disconnected> for NodeError {
    fn from(_: Disconnected) -> Self {
        Self::Cancelled
    }
}

impl NodeError {
    /// Text for the client's `error` event.
    pub fn user_message(&self) -> String {
        match self {
            Self::Tool(ToolError::Timeout { .. }) => "查询超时了，请稍后再试。".into(),
            Self::Tool(_) => "外部服务暂时不可用，本步操作未生效，请稍后再试。".into(),
            Self::Provider(_) => "回复生成失败，请稍后再试。".into(),
            Self::State(e) => format!("当前状态无法完成该操作：{e}"),
            Self::Cancelled | Self::Internal(_) => "系统内部错误，请重试。".into(),
        }
    }
}

/// Facts handed from one node to the next within a single turn.
#[derive(Debug, Default)]
pub struct TurnScratch {
    /// Gated node the sentinel is asked to approve.
    pub intended: Option<NodeId>,
    /// REVIEW rules the user already confirmed.
    pub acknowledged: Vec<String>,
    /// The blocking decision, for the block node.
    pub decision: Option<RuleDecision>,
    /// A pending transition the user just declined.
    pub cancelled: Option<NodeId>,
    pub trace_id: Option<String>,
}

pub struct NodeContext<'a> {
    pub node: NodeId,
    /// Working copy; committed only if the node succeeds.
    pub state: &'a mut ConversationState,
    pub message: &'a str,
    pub services: &'a Services,
    pub scratch: &'a mut TurnScratch,
    pub(crate) sink: NodeSink<'a>,
    pub(crate) records: Vec<NodeResult>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node: NodeId,
        state: &'a mut ConversationState,
        message: &'a str,
        services: &'a Services,
        scratch: &'a mut TurnScratch,
        sink: NodeSink<'a>,
    ) -> Self {
        Self {
            node,
            state,
            message,
            services,
            scratch,
            sink,
            records: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.services.today()
    }

    /// Add user-facing text. Streamed nodes send it sentence by sentence.
    pub async fn say(&mut self, text: &str) -> Result<(), NodeError> {
        if self.sink.mode() == StreamMode::Stream {
            for piece in split_increments(text) {
                self.sink.text(&piece).await?;
            }
        } else {
            self.sink.text(text).await?;
        }
        Ok(())
    }

    /// Forward an incremental generator stream.
    pub async fn say_stream(
        &mut self,
        mut rx: tokio::sync::mpsc::Receiver<Result<String, ProviderError>>,
    ) -> Result<(), NodeError> {
        while let Some(piece) = rx.recv().await {
            self.sink.text(&piece?).await?;
        }
        Ok(())
    }

    pub fn control(&mut self, kind: ControlKind, options: Vec<serde_json::Value>) {
        self.sink.control(kind, options);
    }

    pub async fn status(&self, text: &str) -> Result<(), NodeError> {
        Ok(self.sink.status(text).await?)
    }

    pub fn record(&mut self, result: NodeResult) {
        self.records.push(result);
    }

    pub fn span(&self, span: Span) {
        self.services.record_span(self.scratch.trace_id.as_deref(), span);
    }

    /// Call a tool through the gateway and return its structured data.
    /// The raw output is kept as `last_tool_output` for the content rules.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, NodeError> {
        let started = Instant::now();
        let outcome = self.services.tools.call(name, arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let success = outcome.as_ref().is_ok_and(|r| r.success);

        self.records
            .push(NodeResult::tool_event(self.node, name, success, duration_ms));
        self.span(
            Span::new(SpanKind::ToolCall, name)
                .with_meta("node", self.node.as_str())
                .finish(success, duration_ms),
        );

        let result = outcome?;
        if !result.success {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: result.output,
            }
            .into());
        }
        self.state.last_tool_output = Some(result.output);
        result.data.ok_or_else(|| {
            NodeError::Tool(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "no structured data".into(),
            })
        })
    }

    /// Resolve a city to its airport code.
    pub async fn airport_code(&mut self, city: &str) -> Result<String, NodeError> {
        let data = self
            .call_tool("airport_lookup", serde_json::json!({ "city": city }))
            .await?;
        data["airport"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| NodeError::Internal(format!("airport_lookup returned no code for {city}")))
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError>;
}

/// One implementation per node id.
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// The full built-in catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IntentRouterNode));
        registry.register(Arc::new(CollectNode));
        registry.register(Arc::new(PlanNode));
        for leg in [Leg::Flight, Leg::Hotel] {
            registry.register(Arc::new(SearchNode::new(leg)));
            registry.register(Arc::new(SelectNode::new(leg)));
            registry.register(Arc::new(PayNode::new(leg)));
        }
        registry.register(Arc::new(SummaryNode));
        registry.register(Arc::new(CheckWeatherNode));
        registry.register(Arc::new(SideChatNode));
        registry.register(Arc::new(GuideNode));
        registry.register(Arc::new(SentinelNode));
        registry.register(Arc::new(BlockNode));
        registry
    }

    /// Register a node, replacing any implementation with the same id.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        self.nodes.insert(node.id(), node);
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<dyn Node>> {
        self.nodes.get(&id).cloned()
    }

    /// Catalog entries without an implementation.
    pub fn missing(&self) -> Vec<NodeId> {
        NodeId::ALL
            .into_iter()
            .filter(|id| !self.nodes.contains_key(id))
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Option list as control payload entries.
fn option_payloads(options: &[waypoint_core::PresentedOption]) -> Vec<serde_json::Value> {
    options
        .iter()
        .map(|o| {
            serde_json::json!({
                "token": o.token,
                "title": o.title,
                "price": o.price,
                "detail": o.detail,
            })
        })
        .collect()
}

fn select_control(leg: Leg) -> ControlKind {
    match leg {
        Leg::Flight => ControlKind::SelectFlight,
        Leg::Hotel => ControlKind::SelectHotel,
    }
}

fn city_zh(name: &str) -> &str {
    waypoint_core::geo::resolve(name).map_or(name, |c| c.zh)
}

fn describe_date(date: NaiveDate) -> String {
    const WEEKDAYS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    format!("{}（周{weekday}）出发", date.format("%Y-%m-%d"))
}
