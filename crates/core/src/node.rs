//! The closed node catalog and the per-node result record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::state::Leg;

/// Every node the booking graph knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    IntentRouter,
    Collect,
    Plan,
    SearchFlight,
    SelectFlight,
    PayFlight,
    SearchHotel,
    SelectHotel,
    PayHotel,
    Summary,
    CheckWeather,
    SideChat,
    Guide,
    Sentinel,
    Block,
}

impl NodeId {
    pub const ALL: [NodeId; 15] = [
        NodeId::IntentRouter,
        NodeId::Collect,
        NodeId::Plan,
        NodeId::SearchFlight,
        NodeId::SelectFlight,
        NodeId::PayFlight,
        NodeId::SearchHotel,
        NodeId::SelectHotel,
        NodeId::PayHotel,
        NodeId::Summary,
        NodeId::CheckWeather,
        NodeId::SideChat,
        NodeId::Guide,
        NodeId::Sentinel,
        NodeId::Block,
    ];

    /// The closed set intent classification may choose from.
    pub const ROUTABLE: [NodeId; 12] = [
        NodeId::Collect,
        NodeId::Plan,
        NodeId::SearchFlight,
        NodeId::SelectFlight,
        NodeId::PayFlight,
        NodeId::SearchHotel,
        NodeId::SelectHotel,
        NodeId::PayHotel,
        NodeId::CheckWeather,
        NodeId::SideChat,
        NodeId::Summary,
        NodeId::Guide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentRouter => "intent_router",
            Self::Collect => "collect",
            Self::Plan => "plan",
            Self::SearchFlight => "search_flight",
            Self::SelectFlight => "select_flight",
            Self::PayFlight => "pay_flight",
            Self::SearchHotel => "search_hotel",
            Self::SelectHotel => "select_hotel",
            Self::PayHotel => "pay_hotel",
            Self::Summary => "summary",
            Self::CheckWeather => "check_weather",
            Self::SideChat => "side_chat",
            Self::Guide => "guide",
            Self::Sentinel => "sentinel",
            Self::Block => "block",
        }
    }

    /// Nodes that may only run after the sentinel approved the transition.
    pub fn is_gated(&self) -> bool {
        self.is_selection() || self.is_payment()
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, Self::SelectFlight | Self::SelectHotel)
    }

    pub fn is_payment(&self) -> bool {
        matches!(self, Self::PayFlight | Self::PayHotel)
    }

    pub fn is_routable(&self) -> bool {
        Self::ROUTABLE.contains(self)
    }

    /// The booking leg a search/select/pay node operates on.
    pub fn leg(&self) -> Option<Leg> {
        match self {
            Self::SearchFlight | Self::SelectFlight | Self::PayFlight => Some(Leg::Flight),
            Self::SearchHotel | Self::SelectHotel | Self::PayHotel => Some(Leg::Hotel),
            _ => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|n| n.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown node '{s}'"))
    }
}

/// What a [`NodeResult`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Json,
    Text,
    ToolEvent,
}

/// One node's contribution to a turn. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: NodeId,
    pub kind: ResultKind,
    pub payload: serde_json::Value,
    pub stream_eligible: bool,
}

impl NodeResult {
    pub fn text(node_id: NodeId, text: impl Into<String>, stream_eligible: bool) -> Self {
        Self {
            node_id,
            kind: ResultKind::Text,
            payload: serde_json::Value::String(text.into()),
            stream_eligible,
        }
    }

    pub fn json(node_id: NodeId, payload: serde_json::Value) -> Self {
        Self {
            node_id,
            kind: ResultKind::Json,
            payload,
            stream_eligible: false,
        }
    }

    pub fn tool_event(node_id: NodeId, tool: &str, success: bool, duration_ms: u64) -> Self {
        Self {
            node_id,
            kind: ResultKind::ToolEvent,
            payload: serde_json::json!({
                "tool": tool,
                "success": success,
                "duration_ms": duration_ms,
            }),
            stream_eligible: false,
        }
    }

    /// An error record that ends the turn.
    pub fn error(node_id: NodeId, message: impl Into<String>) -> Self {
        Self::json(node_id, serde_json::json!({ "error": message.into() }))
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Json && self.payload.get("error").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for node in NodeId::ALL {
            assert_eq!(node.as_str().parse::<NodeId>().unwrap(), node);
        }
        assert!("checkout".parse::<NodeId>().is_err());
    }

    #[test]
    fn only_select_and_pay_are_gated() {
        let gated: Vec<NodeId> = NodeId::ALL.into_iter().filter(|n| n.is_gated()).collect();
        assert_eq!(
            gated,
            vec![
                NodeId::SelectFlight,
                NodeId::PayFlight,
                NodeId::SelectHotel,
                NodeId::PayHotel
            ]
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&NodeId::CheckWeather).unwrap();
        assert_eq!(json, r#""check_weather""#);
    }

    #[test]
    fn router_and_gate_nodes_are_not_routable() {
        assert!(!NodeId::IntentRouter.is_routable());
        assert!(!NodeId::Sentinel.is_routable());
        assert!(!NodeId::Block.is_routable());
        assert_eq!(NodeId::PayHotel.leg(), Some(Leg::Hotel));
    }
}
