//! Rule data model: verdicts, decisions, and the evaluation contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use waypoint_core::{ConversationState, NodeId};

/// Outcome of a rule. Ordered by severity: `Pass < Review < Block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Let the transition through.
    Pass,
    /// Pause and ask the user to confirm.
    Review,
    /// Refuse the transition.
    Block,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Review => f.write_str("REVIEW"),
            Self::Block => f.write_str("BLOCK"),
        }
    }
}

/// A rule's judgement on one proposed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecision {
    pub rule_id: String,
    pub verdict: Verdict,
    /// User-facing explanation. Never contains raw evidence.
    pub reason: String,
    /// Masked excerpt of what triggered the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl RuleDecision {
    pub fn pass(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            verdict: Verdict::Pass,
            reason: String::new(),
            evidence: None,
        }
    }

    pub fn review(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            verdict: Verdict::Review,
            reason: reason.into(),
            evidence: None,
        }
    }

    pub fn block(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            verdict: Verdict::Block,
            reason: reason.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// A proposed move between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: NodeId,
    pub to: NodeId,
}

impl Transition {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    pub transition: Transition,
    pub state: &'a ConversationState,
    pub raw_text: &'a str,
    pub now: DateTime<Utc>,
}

impl RuleContext<'_> {
    /// The user text plus the last tool output, the two inputs content
    /// rules scan.
    pub fn scanned_texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.raw_text).chain(self.state.last_tool_output.as_deref())
    }
}

/// The evaluation contract every rule implements.
///
/// Rules are registered explicitly on the [`crate::RuleEngine`] and run in
/// registration order.
pub trait Rule: Send + Sync {
    /// Stable identifier, reported in decisions and logs.
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether this rule has an opinion on the transition at all.
    fn applies_to(&self, transition: &Transition) -> bool;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision;
}

/// Mask all but the first and last few characters of a sensitive match.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 5))
}
