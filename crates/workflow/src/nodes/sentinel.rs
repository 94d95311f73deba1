use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use waypoint_core::state::{PendingTransition, SecurityFlag};
use waypoint_core::{ControlKind, DomainEvent, NodeId, NodeResult};
use waypoint_rules::{RuleDecision, Transition, Verdict, ENGINE_RULE_ID};
use waypoint_telemetry::{Span, SpanKind};

use super::{Next, Node, NodeContext, NodeError};

/// Asks the rule engine whether the intended gated node may run.
pub struct SentinelNode;

#[async_trait]
impl Node for SentinelNode {
    fn id(&self) -> NodeId {
        NodeId::Sentinel
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let Some(target) = ctx.scratch.intended.take() else {
            return Err(NodeError::Internal("sentinel entered without a target".into()));
        };
        let from = ctx.state.current_node.unwrap_or(NodeId::IntentRouter);
        let transition = Transition::new(from, target);
        let mut acknowledged = std::mem::take(&mut ctx.scratch.acknowledged);

        let started = Instant::now();
        let evaluation =
            ctx.services
                .rules
                .evaluate_detailed(transition, ctx.state, ctx.message, &acknowledged);
        let elapsed = started.elapsed().as_millis() as u64;
        for check in &evaluation.checks {
            ctx.span(
                Span::new(SpanKind::RuleCheck, check.rule_id.as_str())
                    .with_meta("verdict", check.verdict.to_string())
                    .with_meta("transition", transition.to_string())
                    .finish(true, elapsed),
            );
        }

        let decision = evaluation.decision;
        if decision.verdict == Verdict::Pass {
            return Ok(Next::Goto(target));
        }

        flag(ctx, &decision, target);
        ctx.record(NodeResult::json(
            NodeId::Sentinel,
            json!({
                "rule_id": decision.rule_id,
                "verdict": decision.verdict,
                "target": target,
            }),
        ));

        if decision.verdict == Verdict::Block {
            ctx.scratch.decision = Some(decision);
            return Ok(Next::Goto(NodeId::Block));
        }

        for check in evaluation.checks.iter().filter(|c| c.verdict == Verdict::Review) {
            if !acknowledged.contains(&check.rule_id) {
                acknowledged.push(check.rule_id.clone());
            }
        }
        ctx.state.pending = Some(PendingTransition {
            target,
            acknowledged,
            reason: decision.reason.clone(),
            requested_at: ctx.now(),
        });
        ctx.say(&format!("{}。回复“确认”继续，或回复“取消”放弃。", decision.reason))
            .await?;
        ctx.control(
            ControlKind::Confirm,
            vec![json!({
                "target": target,
                "rule_id": decision.rule_id,
                "reason": decision.reason,
            })],
        );
        Ok(Next::Wait)
    }
}

fn flag(ctx: &mut NodeContext<'_>, decision: &RuleDecision, target: NodeId) {
    let now = ctx.now();
    ctx.state.security_flags.push(SecurityFlag {
        rule_id: decision.rule_id.clone(),
        verdict: decision.verdict.to_string(),
        node: target,
        reason: decision.reason.clone(),
        at: now,
    });
    ctx.services.events.publish(DomainEvent::RuleTriggered {
        thread_id: ctx.state.thread_id.clone(),
        rule_id: decision.rule_id.clone(),
        verdict: decision.verdict.to_string(),
        target: target.to_string(),
        timestamp: now,
    });
}

/// Explains a blocked transition. Only the rule's reason reaches the user.
pub struct BlockNode;

#[async_trait]
impl Node for BlockNode {
    fn id(&self) -> NodeId {
        NodeId::Block
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let decision = ctx.scratch.decision.take().unwrap_or_else(|| {
            warn!("Block entered without a decision");
            RuleDecision::block(ENGINE_RULE_ID, "该操作未通过安全检查")
        });

        ctx.say(&format!("操作已被拦截：{}", decision.reason)).await?;
        ctx.control(
            ControlKind::Blocked,
            vec![json!({ "rule_id": decision.rule_id, "reason": decision.reason })],
        );
        Ok(Next::Wait)
    }
}
