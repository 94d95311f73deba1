use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};
use waypoint_config::AmbiguityConfig;
use waypoint_core::{Classification, ConversationState, NodeId};
use waypoint_telemetry::{Span, SpanKind};

use super::{Next, Node, NodeContext, NodeError};

/// Classifies the message and picks the next node. Emits nothing.
pub struct IntentRouterNode;

#[async_trait]
impl Node for IntentRouterNode {
    fn id(&self) -> NodeId {
        NodeId::IntentRouter
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let started = Instant::now();

        if let Some(pending) = ctx.state.pending.take() {
            if ctx.services.lexicon.is_affirmative(ctx.message) {
                debug!(target = %pending.target, "Pending transition confirmed");
                ctx.scratch.intended = Some(pending.target);
                ctx.scratch.acknowledged = pending.acknowledged;
                record(ctx, pending.target, "confirmed", 1.0, started);
                return Ok(Next::Goto(NodeId::Sentinel));
            }
            debug!(target = %pending.target, "Pending transition dropped");
            ctx.scratch.cancelled = Some(pending.target);
            if ctx.services.lexicon.is_negative(ctx.message) {
                record(ctx, NodeId::Guide, "declined", 1.0, started);
                return Ok(Next::Goto(NodeId::Guide));
            }
        }

        let classification = match ctx.services.classifier.classify(ctx.state, ctx.message).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Classifier failed, using the ambiguity fallback");
                Classification::unknown(ctx.state.in_booking_track())
            }
        };

        let target = route(&classification, ctx.state, &ctx.services.config.executor.ambiguity);
        debug!(
            classified = ?classification.target,
            confidence = classification.confidence,
            routed = %target,
            "Routed message"
        );
        record(ctx, target, "classified", classification.confidence, started);

        if target.is_gated() {
            ctx.scratch.intended = Some(target);
            return Ok(Next::Goto(NodeId::Sentinel));
        }
        Ok(Next::Goto(target))
    }
}

/// Apply the ambiguity fallback and the slot precondition to a
/// classification. Gated targets come back as-is for the sentinel.
pub(crate) fn route(
    classification: &Classification,
    state: &ConversationState,
    ambiguity: &AmbiguityConfig,
) -> NodeId {
    let target = classification
        .target
        .filter(|t| t.is_routable() && classification.confidence >= ambiguity.min_confidence)
        .unwrap_or(if classification.business {
            ambiguity.business_fallback
        } else {
            ambiguity.chat_fallback
        });

    match target {
        NodeId::Plan | NodeId::SearchFlight | NodeId::SearchHotel if !state.slots.is_complete() => {
            NodeId::Collect
        }
        t => t,
    }
}

fn record(ctx: &NodeContext<'_>, target: NodeId, reason: &str, confidence: f32, started: Instant) {
    ctx.span(
        Span::new(SpanKind::RouterDecision, target.as_str())
            .with_meta("reason", reason)
            .with_meta("confidence", f64::from(confidence))
            .with_meta("classifier", ctx.services.classifier.name())
            .finish(true, started.elapsed().as_millis() as u64),
    );
}
