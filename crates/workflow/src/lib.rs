//! Waypoint workflow engine.
//!
//! Drives a multi-turn booking dialogue over a closed graph of nodes:
//!
//! - [`Graph`]: the explicit transition table, validated at load
//! - [`NodeRegistry`]: one implementation per node id
//! - [`GraphExecutor`]: runs one turn from `intent_router` to a user-wait stop
//! - [`StreamPolicy`] and [`EventEmitter`]: decide how node output surfaces
//!   and number every event on the thread
//! - [`Orchestrator`]: per-thread serialization, persistence, cancellation
//!   and panic containment
//!
//! Language understanding ([`nlu`]) and small talk ([`generator`]) ship as
//! deterministic implementations of the collaborator traits so the whole
//! flow runs offline.

pub mod emitter;
pub mod executor;
pub mod generator;
pub mod graph;
pub mod nlu;
pub mod nodes;
pub mod orchestrator;
pub mod policy;
pub mod services;

use thiserror::Error;
use waypoint_core::NodeId;
use waypoint_rules::RuleError;

pub use emitter::{Disconnected, EventEmitter, NodeSink};
pub use executor::{GraphExecutor, TurnError, TurnOutcome, TurnStatus};
pub use generator::OfflineGenerator;
pub use graph::{Graph, GraphError};
pub use nlu::{KeywordClassifier, Lexicon};
pub use nodes::{Next, Node, NodeContext, NodeError, NodeRegistry};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use policy::{StreamMode, StreamPolicy};
pub use services::Services;

/// Errors raised while wiring the engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("rule engine setup failed: {0}")]
    Rules(#[from] RuleError),

    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    #[error("no implementation registered for node '{0}'")]
    MissingNode(NodeId),

    #[error("failed to compile text patterns: {0}")]
    Lexicon(#[from] regex_lite::Error),
}
