use async_trait::async_trait;
use serde_json::json;
use waypoint_core::{Leg, NodeId, NodeResult, StateError};

use super::{option_payloads, select_control, Next, Node, NodeContext, NodeError};

/// Locks one option from the most recent list for a leg.
pub struct SelectNode {
    leg: Leg,
}

impl SelectNode {
    pub fn new(leg: Leg) -> Self {
        Self { leg }
    }

    /// Ask again with the current list. Nothing in the state changes.
    async fn reprompt(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let options = ctx.state.presented.options(self.leg).to_vec();
        if options.is_empty() {
            ctx.say(&format!("还没有可选的{}，先告诉我要搜索{}吧。", self.leg.label(), self.leg.label()))
                .await?;
            return Ok(Next::Wait);
        }
        let prefix = self.leg.token_prefix();
        ctx.say(&format!(
            "没有找到对应的{}，请回复 {prefix}1 到 {prefix}{} 中的一个。",
            self.leg.label(),
            options.len()
        ))
        .await?;
        ctx.control(select_control(self.leg), option_payloads(&options));
        Ok(Next::Wait)
    }
}

#[async_trait]
impl Node for SelectNode {
    fn id(&self) -> NodeId {
        match self.leg {
            Leg::Flight => NodeId::SelectFlight,
            Leg::Hotel => NodeId::SelectHotel,
        }
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let Some(index) = ctx.services.lexicon.choice(ctx.message, self.leg) else {
            return self.reprompt(ctx).await;
        };

        let option = match ctx.state.lock_option(self.leg, index).cloned() {
            Ok(option) => option,
            Err(StateError::AlreadyPaid(_)) => {
                ctx.say(&format!("{}已经支付，不能再更换。", self.leg.label())).await?;
                return Ok(Next::Wait);
            }
            Err(StateError::NothingPresented(_) | StateError::OptionOutOfRange { .. }) => {
                return self.reprompt(ctx).await;
            }
            Err(e) => return Err(e.into()),
        };

        ctx.say(&format!(
            "已为你锁定{} {}：{}，¥{}。",
            self.leg.label(),
            option.token,
            option.title,
            option.price
        ))
        .await?;
        ctx.record(NodeResult::json(
            self.id(),
            json!({ "locked": option.token, "price": option.price }),
        ));
        Ok(Next::Goto(NodeId::Guide))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, option, planned_state};
    use super::*;
    use waypoint_core::ConversationState;

    use crate::nodes::TurnScratch;

    fn three_flights() -> ConversationState {
        let mut state = planned_state();
        state.present(
            Leg::Flight,
            vec![option("F1", 1200), option("F2", 1500), option("F3", 1800)],
        );
        state
    }

    #[tokio::test]
    async fn token_locks_that_option() {
        let services = testing::services();
        let mut state = three_flights();
        let run = testing::run(&SelectNode::new(Leg::Flight), &services, &mut state, "F2", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Goto(NodeId::Guide)));
        assert!(state.booking.flight.is_locked());
        assert_eq!(state.booking.flight.selection().unwrap().token, "F2");
        assert!(run.control().is_none());
    }

    #[tokio::test]
    async fn bare_digit_is_accepted() {
        let services = testing::services();
        let mut state = three_flights();
        let run = testing::run(&SelectNode::new(Leg::Flight), &services, &mut state, "3", TurnScratch::default()).await;

        assert!(run.next.is_ok());
        assert_eq!(state.booking.flight.selection().unwrap().price, 1800);
    }

    #[tokio::test]
    async fn out_of_range_reprompts_without_change() {
        let services = testing::services();
        let mut state = three_flights();
        state.lock_option(Leg::Flight, 1).unwrap();
        let before = serde_json::to_value(&state).unwrap();

        let run = testing::run(&SelectNode::new(Leg::Flight), &services, &mut state, "F9", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert_eq!(serde_json::to_value(&state).unwrap(), before);
        assert!(run.text().contains("F1 到 F3"));
        assert_eq!(run.control().unwrap().options.len(), 3);
    }

    #[tokio::test]
    async fn other_leg_token_is_not_a_choice() {
        let services = testing::services();
        let mut state = three_flights();
        let run = testing::run(&SelectNode::new(Leg::Flight), &services, &mut state, "H1", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert!(!state.booking.flight.is_locked());
    }

    #[tokio::test]
    async fn nothing_presented_asks_for_search() {
        let services = testing::services();
        let mut state = planned_state();
        let run = testing::run(&SelectNode::new(Leg::Hotel), &services, &mut state, "H1", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert!(run.control().is_none());
        assert!(!state.booking.hotel.is_locked());
    }
}
