//! Error types for the Waypoint domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::state::Leg;

/// The top-level error type for all Waypoint operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Conversation state errors ---
    #[error("State error: {0}")]
    State(#[from] StateError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the generation / classification collaborator.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted state for thread {thread_id}: {reason}")]
    Corrupted { thread_id: String, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Violations of the booking invariants, raised by the state methods
/// that guard them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("no {0} options have been presented yet")]
    NothingPresented(Leg),

    #[error("{leg} option {index} is out of range (1..={available})")]
    OptionOutOfRange { leg: Leg, index: usize, available: usize },

    #[error("{0} booking has no locked selection")]
    NotLocked(Leg),

    #[error("{0} booking is already paid and cannot change")]
    AlreadyPaid(Leg),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Timeout {
            tool_name: "flight_search".into(),
            timeout_secs: 10,
        });
        assert!(err.to_string().contains("flight_search"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn state_error_names_the_leg() {
        let err = Error::State(StateError::OptionOutOfRange {
            leg: Leg::Flight,
            index: 9,
            available: 3,
        });
        let text = err.to_string();
        assert!(text.contains("flight"));
        assert!(text.contains("1..=3"));
    }
}
