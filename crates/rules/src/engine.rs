//! Rule enforcement engine.
//!
//! The engine evaluates every applicable rule against a proposed transition
//! and aggregates the results into one [`RuleDecision`] the executor must
//! obey. Aggregation keeps the most severe verdict; on equal severity the
//! rule registered first wins, which keeps evaluation deterministic and
//! auditable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use waypoint_config::AppConfig;
use waypoint_core::{Clock, ConversationState};

use crate::builtin;
use crate::model::{Rule, RuleContext, RuleDecision, Transition, Verdict};
use crate::RuleError;

/// Identifier reported when no rule objected.
pub const ENGINE_RULE_ID: &str = "engine";

/// An entry in the rule evaluation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleLogEntry {
    pub thread_id: String,
    pub transition: Transition,
    pub rule_id: String,
    pub verdict: Verdict,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Maximum log entries kept in memory.
const MAX_RULE_LOG: usize = 5_000;

/// Aggregate decision plus the per-rule breakdown.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: RuleDecision,
    pub checks: Vec<RuleDecision>,
}

/// The rule engine.
///
/// Thread-safe. Rules are held in registration order.
pub struct RuleEngine {
    rules: RwLock<Vec<Arc<dyn Rule>>>,
    log: RwLock<Vec<RuleLogEntry>>,
    clock: Arc<dyn Clock>,
}

impl RuleEngine {
    /// Create an engine with no rules.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            log: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Create an engine with the built-in rules enabled by `config`, in
    /// their fixed order: pii, prompt_injection, sensitive_location,
    /// financial_transaction, night_curfew.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, RuleError> {
        let engine = Self::new(clock);
        let rules = &config.rules;
        if rules.pii {
            engine.register(Arc::new(builtin::PiiRule::new()?))?;
        }
        if rules.prompt_injection {
            engine.register(Arc::new(builtin::PromptInjectionRule::new()?))?;
        }
        if !rules.sensitive_locations.is_empty() {
            engine.register(Arc::new(builtin::SensitiveLocationRule::new(
                &rules.sensitive_locations,
            )))?;
        }
        if rules.financial.enabled {
            engine.register(Arc::new(builtin::FinancialRule::new(
                rules.financial.review_threshold,
            )))?;
        }
        if rules.curfew.enabled {
            engine.register(Arc::new(builtin::NightCurfewRule::from_config(
                &rules.curfew,
                config.utc_offset_hours,
            )?))?;
        }
        info!(rules = ?engine.rule_ids(), "Rule engine ready");
        Ok(engine)
    }

    /// Append a rule to the evaluation order. Ids must be unique.
    pub fn register(&self, rule: Arc<dyn Rule>) -> Result<(), RuleError> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.iter().any(|r| r.id() == rule.id()) {
            return Err(RuleError::DuplicateRule(rule.id().to_string()));
        }
        debug!(rule = rule.id(), position = rules.len(), "Rule registered");
        rules.push(rule);
        Ok(())
    }

    /// Registered rule ids, in evaluation order.
    pub fn rule_ids(&self) -> Vec<String> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    /// Evaluate a transition and return the aggregate decision.
    pub fn evaluate(
        &self,
        transition: Transition,
        state: &ConversationState,
        raw_text: &str,
    ) -> RuleDecision {
        self.evaluate_detailed(transition, state, raw_text, &[]).decision
    }

    /// Evaluate a transition, returning the aggregate and every applicable
    /// rule's decision.
    ///
    /// A REVIEW from a rule listed in `acknowledged` was already confirmed by
    /// the user and no longer pauses the transition. BLOCK is never waived.
    pub fn evaluate_detailed(
        &self,
        transition: Transition,
        state: &ConversationState,
        raw_text: &str,
        acknowledged: &[String],
    ) -> Evaluation {
        let ctx = RuleContext {
            transition,
            state,
            raw_text,
            now: self.clock.now(),
        };

        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let checks: Vec<RuleDecision> = rules
            .iter()
            .filter(|r| r.applies_to(&transition))
            .map(|r| r.evaluate(&ctx))
            .collect();
        drop(rules);

        let mut aggregate: Option<&RuleDecision> = None;
        for check in &checks {
            let effective = effective_verdict(check, acknowledged);
            if effective == Verdict::Pass {
                continue;
            }
            let current = aggregate.map(|d| effective_verdict(d, acknowledged));
            if current.is_none_or(|v| effective > v) {
                aggregate = Some(check);
            }
        }

        let decision = match aggregate {
            Some(d) => d.clone(),
            None => RuleDecision::pass(ENGINE_RULE_ID),
        };

        for check in checks.iter().filter(|c| !c.is_pass()) {
            self.record(state, transition, check);
        }

        match decision.verdict {
            Verdict::Block => warn!(
                rule = %decision.rule_id,
                transition = %transition,
                thread = %state.thread_id,
                "Transition BLOCKED: {}",
                decision.reason
            ),
            Verdict::Review => info!(
                rule = %decision.rule_id,
                transition = %transition,
                thread = %state.thread_id,
                "Transition needs REVIEW: {}",
                decision.reason
            ),
            Verdict::Pass => debug!(transition = %transition, checked = checks.len(), "Transition passed"),
        }

        Evaluation { decision, checks }
    }

    /// Get the evaluation log (non-PASS checks only).
    pub fn log(&self) -> Vec<RuleLogEntry> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, state: &ConversationState, transition: Transition, check: &RuleDecision) {
        let entry = RuleLogEntry {
            thread_id: state.thread_id.clone(),
            transition,
            rule_id: check.rule_id.clone(),
            verdict: check.verdict,
            reason: check.reason.clone(),
            timestamp: self.clock.now(),
        };
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        if log.len() >= MAX_RULE_LOG {
            log.drain(..MAX_RULE_LOG / 10);
        }
        log.push(entry);
    }
}

fn effective_verdict(decision: &RuleDecision, acknowledged: &[String]) -> Verdict {
    match decision.verdict {
        Verdict::Review if acknowledged.iter().any(|a| a == &decision.rule_id) => Verdict::Pass,
        other => other,
    }
}
