use async_trait::async_trait;
use serde_json::json;
use waypoint_core::state::LegBooking;
use waypoint_core::{ControlKind, Leg, NodeId, NodeResult, StateError};

use super::{city_zh, describe_date, Next, Node, NodeContext, NodeError};
use crate::nlu::skipped_leg;

/// Assembles the itinerary once both legs are paid or skipped. Reads state
/// only, no collaborator calls.
pub struct SummaryNode;

#[async_trait]
impl Node for SummaryNode {
    fn id(&self) -> NodeId {
        NodeId::Summary
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        if let Some(leg) = skipped_leg(ctx.message) {
            match ctx.state.skip(leg) {
                Ok(()) => ctx.say(&format!("好的，本次不预订{}。", leg.label())).await?,
                Err(StateError::AlreadyPaid(_)) => {
                    ctx.say(&format!("{}已经支付，不能跳过。", leg.label())).await?
                }
                Err(e) => return Err(e.into()),
            }
        }

        let pending: Vec<&str> = [Leg::Flight, Leg::Hotel]
            .into_iter()
            .filter(|&leg| !ctx.state.booking.leg(leg).is_done())
            .map(|leg| leg.label())
            .collect();
        if !pending.is_empty() {
            ctx.say(&format!(
                "生成行程单前，{}还需要完成支付，或告诉我不预订（例如“不订酒店”）。",
                pending.join("和")
            ))
            .await?;
            return Ok(Next::Wait);
        }

        let state = &*ctx.state;
        let route = match (&state.slots.origin, &state.slots.destination) {
            (Some(o), Some(d)) => format!("{} → {}", city_zh(o), city_zh(d)),
            _ => "未填写".to_string(),
        };
        let mut text = format!("你的行程单：\n路线：{route}\n");
        if let Some(date) = state.slots.date {
            text.push_str(&format!("日期：{}\n", describe_date(date)));
        }
        if let Some(tier) = state.chosen_plan {
            text.push_str(&format!("方案：{} {}\n", tier.token(), tier.label()));
        }
        text.push_str(&leg_line(Leg::Flight, &state.booking.flight));
        text.push_str(&leg_line(Leg::Hotel, &state.booking.hotel));
        let total: u32 = [&state.booking.flight, &state.booking.hotel]
            .into_iter()
            .filter(|b| b.is_paid())
            .filter_map(|b| b.selection().map(|s| s.price))
            .sum();
        text.push_str(&format!("已支付合计：¥{total}\n祝你旅途愉快！"));

        let itinerary = json!({
            "origin": state.slots.origin,
            "destination": state.slots.destination,
            "date": state.slots.date,
            "plan": state.chosen_plan,
            "flight": leg_json(&state.booking.flight),
            "hotel": leg_json(&state.booking.hotel),
            "total_paid": total,
        });

        ctx.say(&text).await?;
        ctx.control(ControlKind::Itinerary, vec![itinerary.clone()]);
        ctx.record(NodeResult::json(NodeId::Summary, itinerary));
        Ok(Next::Wait)
    }
}

fn leg_line(leg: Leg, booking: &LegBooking) -> String {
    match (booking.selection(), booking.order_id()) {
        (Some(s), Some(order)) if booking.is_paid() => {
            format!("{}：{} {}，¥{}，订单号 {order}\n", leg.label(), s.token, s.title, s.price)
        }
        _ => format!("{}：未预订\n", leg.label()),
    }
}

fn leg_json(booking: &LegBooking) -> serde_json::Value {
    if booking.is_skipped() {
        return json!({ "skipped": true });
    }
    json!({
        "token": booking.selection().map(|s| s.token.as_str()),
        "title": booking.selection().map(|s| s.title.as_str()),
        "price": booking.selection().map(|s| s.price),
        "order_id": booking.order_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, option, planned_state};
    use super::*;
    use waypoint_core::{ConversationState, EventType};

    use crate::nodes::TurnScratch;

    fn flight_paid() -> ConversationState {
        let mut state = planned_state();
        state.present(Leg::Flight, vec![option("F1", 1200)]);
        state.lock_option(Leg::Flight, 1).unwrap();
        state.settle(Leg::Flight, || "FL-0001".into()).unwrap();
        state
    }

    #[tokio::test]
    async fn waits_until_both_legs_are_done() {
        let services = testing::services();
        let mut state = flight_paid();
        let run = testing::run(&SummaryNode, &services, &mut state, "行程单", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert!(run.control().is_none());
        assert!(run.text().contains("酒店"));
    }

    #[tokio::test]
    async fn skipping_hotel_completes_the_itinerary() {
        let services = testing::services();
        let mut state = flight_paid();
        let run = testing::run(&SummaryNode, &services, &mut state, "不订酒店了", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert!(state.booking.hotel.is_skipped());
        let control = run.control().unwrap();
        assert_eq!(control.kind, ControlKind::Itinerary);
        assert_eq!(control.options[0]["flight"]["order_id"], "FL-0001");
        assert_eq!(control.options[0]["hotel"]["skipped"], true);
        assert!(run.text().contains("FL-0001"));
        assert!(run.records.iter().all(|r| r.kind != waypoint_core::ResultKind::ToolEvent));
    }

    #[tokio::test]
    async fn itinerary_is_streamed() {
        let services = testing::services();
        let mut state = flight_paid();
        state.skip(Leg::Hotel).unwrap();
        let run = testing::run(&SummaryNode, &services, &mut state, "总结", TurnScratch::default()).await;

        let messages: Vec<_> = run.events.iter().filter_map(|e| e.as_message()).collect();
        assert!(messages.len() > 1);
        assert!(messages.iter().all(|m| m.is_stream));
        assert_eq!(run.events.last().unwrap().event_type(), EventType::Control);
    }
}
