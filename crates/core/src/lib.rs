//! # Waypoint Core
//!
//! Domain types, collaborator traits, and error definitions for the Waypoint
//! travel-booking orchestrator. This crate has **no framework dependencies**:
//! it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation, classification, tools,
//! persistence, time) is a trait here. Implementations live in their
//! respective crates, so the executor can run against deterministic stubs in
//! tests and real services in production.

pub mod clock;
pub mod error;
pub mod event;
pub mod generator;
pub mod geo;
pub mod node;
pub mod state;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, ProviderError, Result, StateError, StoreError, ToolError};
pub use event::{
    ControlKind, ControlPayload, DomainEvent, EventBody, EventBus, EventType, MessagePayload,
    ProtocolEvent,
};
pub use generator::{Classification, GenerationRequest, Generator, IntentClassifier};
pub use node::{NodeId, NodeResult, ResultKind};
pub use state::{ConversationState, Leg, PlanTier, PresentedOption, SlotName, Slots};
pub use store::StateStore;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
