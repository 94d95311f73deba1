//! Transition rules for Waypoint.
//!
//! Every move into a gated node (a selection or a payment) is proposed to a
//! [`RuleEngine`] before it happens. Each registered [`Rule`] inspects the
//! transition, the conversation state, and the raw user text, and answers
//! PASS, REVIEW, or BLOCK. The engine folds those answers into one decision.
//!
//! ```text
//! select_flight ─┐
//! pay_flight ────┼──▶ RuleEngine ──▶ pii, prompt_injection, sensitive_location,
//! select_hotel ──┤                   financial_transaction, night_curfew
//! pay_hotel ─────┘                          │
//!                                           ▼
//!                                PASS │ REVIEW │ BLOCK
//! ```

pub mod builtin;
mod engine;
mod model;

pub use engine::{Evaluation, RuleEngine, RuleLogEntry, ENGINE_RULE_ID};
pub use model::{mask, Rule, RuleContext, RuleDecision, Transition, Verdict};

/// Errors raised while assembling the rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule '{0}' is already registered")]
    DuplicateRule(String),

    #[error("Rule '{rule}' has an invalid pattern: {detail}")]
    InvalidPattern { rule: String, detail: String },

    #[error("Invalid rule configuration: {0}")]
    InvalidConfig(String),
}
