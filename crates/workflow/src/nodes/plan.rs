use async_trait::async_trait;
use serde_json::json;
use waypoint_core::state::PlanOption;
use waypoint_core::{ControlKind, NodeId, NodeResult, PlanTier};

use super::{city_zh, describe_date, Next, Node, NodeContext, NodeError};

/// Builds the three plan tiers from one travel-guide search.
pub struct PlanNode;

#[async_trait]
impl Node for PlanNode {
    fn id(&self) -> NodeId {
        NodeId::Plan
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let slots = ctx.state.slots.clone();
        let (Some(origin), Some(destination), Some(date)) = (slots.origin, slots.destination, slots.date) else {
            return Err(NodeError::Internal("plan entered with incomplete slots".into()));
        };
        let dest_zh = city_zh(&destination).to_string();

        ctx.status("正在查找目的地攻略").await?;
        let guide = ctx
            .call_tool("web_search", json!({ "query": format!("{dest_zh} 旅游攻略"), "num_results": 3 }))
            .await?;
        let sights: Vec<String> = guide["sights"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|s| s.as_str().map(str::to_string))
            .collect();

        let days = ctx.services.config.tools.hotel_nights + 1;
        let plans: Vec<PlanOption> = PlanTier::ALL
            .into_iter()
            .map(|tier| build_plan(tier, &dest_zh, days, &sights))
            .collect();

        let mut text = format!(
            "为你准备了 {} 个方案：{} → {}，{}，共 {days} 天。\n",
            plans.len(),
            city_zh(&origin),
            dest_zh,
            describe_date(date)
        );
        for plan in &plans {
            text.push_str(&format!(
                "{} {}（约 ¥{}）：{}\n",
                plan.token,
                plan.tier.label(),
                plan.price_estimate,
                plan.itinerary.join(" / ")
            ));
        }
        text.push_str("回复 P1、P2 或 P3 选择方案，我会按方案为你搜索机票。");
        ctx.say(&text).await?;

        let payload = serde_json::to_value(&plans).map_err(|e| NodeError::Internal(e.to_string()))?;
        let options = payload.as_array().cloned().unwrap_or_default();
        ctx.control(ControlKind::SelectPlan, options);
        ctx.record(NodeResult::json(NodeId::Plan, payload));

        ctx.state.plan_options = plans;
        ctx.state.chosen_plan = None;
        Ok(Next::Wait)
    }
}

fn build_plan(tier: PlanTier, destination: &str, days: u32, sights: &[String]) -> PlanOption {
    let (per_day, stay, pace) = match tier {
        PlanTier::Economy => (1_100, "经济型酒店", "公共交通串联热门景点"),
        PlanTier::Luxury => (4_200, "五星酒店", "专车接送，精选餐厅"),
        PlanTier::Family => (2_400, "亲子家庭房", "节奏放慢，留足休息时间"),
    };

    let mut itinerary = vec![format!("D1 抵达{destination}，入住{stay}")];
    let middle = days.saturating_sub(2) as usize;
    for day in 0..middle {
        let sight = sights
            .get(day % sights.len().max(1))
            .map_or("城市漫步", String::as_str);
        itinerary.push(format!("D{} {sight}，{pace}", day + 2));
    }
    if days > 1 {
        itinerary.push(format!("D{days} 自由活动后返程"));
    }

    PlanOption {
        token: tier.token().to_string(),
        tier,
        title: format!("{destination}{days}日 · {}", tier.label()),
        price_estimate: per_day * days,
        days,
        itinerary,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, planned_state};
    use super::*;
    use waypoint_core::EventType;

    use crate::nodes::TurnScratch;

    #[tokio::test]
    async fn offers_three_tiers_with_one_buffered_message() {
        let services = testing::services();
        let mut state = planned_state();
        let run = testing::run(&PlanNode, &services, &mut state, "", TurnScratch::default()).await;

        assert_eq!(run.next.as_ref().ok(), Some(&Next::Wait));
        assert_eq!(state.plan_options.len(), 3);
        assert_eq!(state.plan_options[0].token, "P1");
        assert_eq!(state.plan_options[2].tier, PlanTier::Family);

        let kinds: Vec<EventType> = run.events.iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec![EventType::Status, EventType::Message, EventType::Control]);
        let control = run.control().unwrap();
        assert_eq!(control.kind, ControlKind::SelectPlan);
        assert_eq!(control.options.len(), 3);
        assert!(!run.events[1].as_message().unwrap().is_stream);
    }

    #[tokio::test]
    async fn searches_the_web_once() {
        let services = testing::services();
        let mut state = planned_state();
        let run = testing::run(&PlanNode, &services, &mut state, "", TurnScratch::default()).await;
        let tool_events = run
            .records
            .iter()
            .filter(|r| r.kind == waypoint_core::ResultKind::ToolEvent)
            .count();
        assert_eq!(tool_events, 1);
    }

    #[test]
    fn itinerary_spans_the_trip() {
        let plan = build_plan(PlanTier::Luxury, "东京", 4, &["浅草寺".to_string()]);
        assert_eq!(plan.itinerary.len(), 4);
        assert!(plan.itinerary[1].contains("浅草寺"));
        assert!(plan.itinerary[3].starts_with("D4"));
        assert_eq!(plan.price_estimate, 16_800);
    }
}
