//! The explicit transition table of the booking graph.
//!
//! Every hop the executor takes is checked against this table. The table is
//! validated once at load: each node has edges or is a user-wait stop, every
//! node is reachable from `intent_router`, every node can reach a stop, and
//! gated nodes can only be entered from `sentinel`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;

use thiserror::Error;
use waypoint_core::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node '{0}' has no outgoing edges and is not a user-wait stop")]
    Missing(NodeId),

    #[error("node '{0}' is unreachable from intent_router")]
    Unreachable(NodeId),

    #[error("node '{0}' cannot reach a user-wait stop")]
    NoExit(NodeId),

    #[error("gated node '{node}' is entered from '{from}' instead of sentinel")]
    Ungated { node: NodeId, from: NodeId },

    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: NodeId, to: NodeId },

    #[error("node '{0}' cannot stop the turn")]
    IllegalWait(NodeId),
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    waits: BTreeSet<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.entry(from).or_default().insert(to);
        self
    }

    pub fn edges(self, from: NodeId, to: &[NodeId]) -> Self {
        to.iter().fold(self, |g, &t| g.edge(from, t))
    }

    /// Mark a node as a place where the turn may stop for user input.
    pub fn wait(mut self, node: NodeId) -> Self {
        self.waits.insert(node);
        self
    }

    /// The booking graph.
    pub fn standard() -> Self {
        use NodeId::*;

        let graph = Self::new()
            .edges(
                IntentRouter,
                &[Collect, Plan, SearchFlight, SearchHotel, CheckWeather, SideChat, Summary, Guide, Sentinel],
            )
            .edges(Sentinel, &[SelectFlight, SelectHotel, PayFlight, PayHotel, Block])
            .edge(Collect, Plan)
            .edge(SelectFlight, Guide)
            .edge(SelectHotel, Guide)
            .edge(PayFlight, Guide)
            .edges(PayHotel, &[Guide, Summary]);

        [
            Collect, Plan, SearchFlight, SelectFlight, SearchHotel, SelectHotel, Summary,
            CheckWeather, SideChat, Guide, Sentinel, Block,
        ]
        .into_iter()
        .fold(graph, Graph::wait)
    }

    pub fn allows(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.get(&from).is_some_and(|s| s.contains(&to))
    }

    pub fn check(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(GraphError::IllegalTransition { from, to })
        }
    }

    pub fn is_wait(&self, node: NodeId) -> bool {
        self.waits.contains(&node)
    }

    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .iter()
            .filter(move |(_, to)| to.contains(&node))
            .map(|(&from, _)| from)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        for node in NodeId::ALL {
            if self.successors(node).next().is_none() && !self.is_wait(node) {
                return Err(GraphError::Missing(node));
            }
        }

        let reachable = self.reach(NodeId::IntentRouter, |n| self.successors(n).collect());
        if let Some(&node) = NodeId::ALL.iter().find(|n| !reachable.contains(n)) {
            return Err(GraphError::Unreachable(node));
        }

        let mut exits = BTreeSet::new();
        for &stop in &self.waits {
            exits.extend(self.reach(stop, |n| self.predecessors(n).collect()));
        }
        if let Some(&node) = NodeId::ALL.iter().find(|n| !exits.contains(n)) {
            return Err(GraphError::NoExit(node));
        }

        for node in NodeId::ALL.into_iter().filter(NodeId::is_gated) {
            if let Some(from) = self.predecessors(node).find(|&p| p != NodeId::Sentinel) {
                return Err(GraphError::Ungated { node, from });
            }
        }
        Ok(())
    }

    fn reach(&self, start: NodeId, next: impl Fn(NodeId) -> Vec<NodeId>) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for n in next(node) {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen
    }

    /// Render as a Mermaid flowchart. Gated edges are thick, stops are
    /// styled as `wait`.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for (from, targets) in &self.edges {
            for to in targets {
                let arrow = if to.is_gated() { "==>" } else { "-->" };
                let _ = writeln!(out, "    {from} {arrow} {to}");
            }
        }
        let waits: Vec<&str> = self.waits.iter().map(NodeId::as_str).collect();
        if !waits.is_empty() {
            out.push_str("    classDef wait fill:#e8f4ff,stroke:#3b82f6\n");
            let _ = writeln!(out, "    class {} wait", waits.join(","));
        }
        out
    }
}
