use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use waypoint_core::{ControlKind, Leg, NodeId, NodeResult};

use super::{Next, Node, NodeContext, NodeError};

/// Simulated settlement of a locked leg.
pub struct PayNode {
    leg: Leg,
}

impl PayNode {
    pub fn new(leg: Leg) -> Self {
        Self { leg }
    }
}

fn new_order_id(leg: Leg) -> String {
    let prefix = match leg {
        Leg::Flight => "FL",
        Leg::Hotel => "HT",
    };
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &id[..8])
}

#[async_trait]
impl Node for PayNode {
    fn id(&self) -> NodeId {
        match self.leg {
            Leg::Flight => NodeId::PayFlight,
            Leg::Hotel => NodeId::PayHotel,
        }
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let leg = self.leg;
        let settlement = ctx.state.settle(leg, || new_order_id(leg))?;
        let amount = ctx
            .state
            .booking
            .leg(leg)
            .selection()
            .map_or(0, |s| s.price);

        if settlement.replayed {
            ctx.say(&format!(
                "{}订单已支付过，订单号 {}，不会重复扣款。",
                leg.label(),
                settlement.order_id
            ))
            .await?;
        } else {
            info!(thread = %ctx.state.thread_id, leg = %leg, order = %settlement.order_id, "Leg paid");
            ctx.say(&format!(
                "{}支付成功！订单号 {}，金额 ¥{amount}。",
                leg.label(),
                settlement.order_id
            ))
            .await?;
        }

        let receipt = json!({
            "leg": leg,
            "order_id": settlement.order_id,
            "amount": amount,
            "replayed": settlement.replayed,
        });
        ctx.control(ControlKind::Payment, vec![receipt.clone()]);
        ctx.record(NodeResult::json(self.id(), receipt));

        if leg == Leg::Hotel && ctx.state.booking.flight.is_done() {
            Ok(Next::Goto(NodeId::Summary))
        } else {
            Ok(Next::Goto(NodeId::Guide))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, option, planned_state};
    use super::*;
    use waypoint_core::{ConversationState, StateError};

    use crate::nodes::TurnScratch;

    fn locked(leg: Leg) -> ConversationState {
        let mut state = planned_state();
        state.present(leg, vec![option("X1", 1300)]);
        state.lock_option(leg, 1).unwrap();
        state
    }

    #[tokio::test]
    async fn settles_a_locked_flight() {
        let services = testing::services();
        let mut state = locked(Leg::Flight);
        let run = testing::run(&PayNode::new(Leg::Flight), &services, &mut state, "支付", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Goto(NodeId::Guide)));
        assert!(state.booking.flight.is_paid());
        let order_id = state.booking.flight.order_id().unwrap();
        assert!(order_id.starts_with("FL-"));
        assert_eq!(order_id.len(), 11);
        let control = run.control().unwrap();
        assert_eq!(control.kind, ControlKind::Payment);
        assert_eq!(control.options[0]["amount"], 1300);
    }

    #[tokio::test]
    async fn replay_returns_the_same_order() {
        let services = testing::services();
        let mut state = locked(Leg::Flight);
        testing::run(&PayNode::new(Leg::Flight), &services, &mut state, "支付", TurnScratch::default()).await;
        let first = state.booking.flight.order_id().unwrap().to_string();

        let run = testing::run(&PayNode::new(Leg::Flight), &services, &mut state, "支付", TurnScratch::default()).await;
        assert_eq!(state.booking.flight.order_id().unwrap(), first);
        assert_eq!(run.control().unwrap().options[0]["replayed"], true);
    }

    #[tokio::test]
    async fn hotel_after_flight_goes_to_summary() {
        let services = testing::services();
        let mut state = locked(Leg::Hotel);
        state.skip(Leg::Flight).unwrap();
        let run = testing::run(&PayNode::new(Leg::Hotel), &services, &mut state, "支付", TurnScratch::default()).await;
        assert_eq!(run.next.as_ref().ok(), Some(&Next::Goto(NodeId::Summary)));
    }

    #[tokio::test]
    async fn unlocked_leg_is_a_state_error() {
        let services = testing::services();
        let mut state = planned_state();
        let run = testing::run(&PayNode::new(Leg::Hotel), &services, &mut state, "支付", TurnScratch::default()).await;

        assert!(matches!(run.next, Err(NodeError::State(StateError::NotLocked(Leg::Hotel)))));
        assert!(!state.booking.hotel.is_paid());
        assert!(run.events.is_empty());
    }
}
