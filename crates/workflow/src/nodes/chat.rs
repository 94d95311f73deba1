//! Streamed nodes that talk without moving the booking forward.

use async_trait::async_trait;
use serde_json::json;
use waypoint_core::geo;
use waypoint_core::{ConversationState, GenerationRequest, Leg, NodeId};

use super::{Next, Node, NodeContext, NodeError};
use crate::generator::SIDE_CHAT_SYSTEM;
use crate::nlu::DateParse;

/// Small talk through the generation collaborator. Only history changes.
pub struct SideChatNode;

#[async_trait]
impl Node for SideChatNode {
    fn id(&self) -> NodeId {
        NodeId::SideChat
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        // The current message is the last turn; it goes in as the prompt.
        let turns = &ctx.state.history;
        let end = turns.len().saturating_sub(1);
        let start = end.saturating_sub(ctx.services.config.executor.history_window);
        let request = GenerationRequest {
            system: SIDE_CHAT_SYSTEM.to_string(),
            history: turns[start..end].to_vec(),
            prompt: ctx.message.to_string(),
        };

        let rx = ctx.services.generator.stream(request).await?;
        ctx.say_stream(rx).await?;
        Ok(Next::Wait)
    }
}

/// Forecast for a city named in the message, else the trip destination.
pub struct CheckWeatherNode;

#[async_trait]
impl Node for CheckWeatherNode {
    fn id(&self) -> NodeId {
        NodeId::CheckWeather
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let location = geo::find_mentions(ctx.message)
            .first()
            .map(|m| m.city.name.to_string())
            .or_else(|| ctx.state.slots.destination.clone());
        let Some(location) = location else {
            ctx.say("想查询哪个城市的天气？").await?;
            return Ok(Next::Wait);
        };

        let date = match ctx.services.lexicon.parse_date(ctx.message, ctx.today()) {
            DateParse::Found(date) => Some(date),
            _ => ctx.state.slots.date,
        };
        let date = date.map(|d| d.format("%Y-%m-%d").to_string());

        let data = ctx
            .call_tool("weather_lookup", json!({ "location": location, "date": date }))
            .await?;

        let when = date.map_or_else(|| "近期".to_string(), |d| format!("{d} "));
        ctx.say(&format!(
            "{}{when}天气：{}，{}~{}°C，湿度 {}%。{}",
            data["location"].as_str().unwrap_or(&location),
            data["conditions"].as_str().unwrap_or("未知"),
            data["low_c"],
            data["high_c"],
            data["humidity"],
            data["tip"].as_str().unwrap_or_default(),
        ))
        .await?;
        Ok(Next::Wait)
    }
}

/// Suggests the next step from the state alone.
pub struct GuideNode;

#[async_trait]
impl Node for GuideNode {
    fn id(&self) -> NodeId {
        NodeId::Guide
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let mut hint = String::new();
        if ctx.scratch.cancelled.take().is_some() {
            hint.push_str("好的，已取消刚才的操作。");
        }
        hint.push_str(&next_step(ctx.state));
        ctx.say(&hint).await?;
        Ok(Next::Wait)
    }
}

pub(crate) fn next_step(state: &ConversationState) -> String {
    if !state.slots.is_complete() {
        return "告诉我出发城市、目的地和出发日期，我来帮你规划行程。".into();
    }
    let nothing_yet = state.plan_options.is_empty()
        && state.presented.flights.is_empty()
        && state.presented.hotels.is_empty()
        && !state.booking.flight.is_done()
        && !state.booking.hotel.is_done();
    if nothing_yet {
        return "行程信息已齐全，回复“生成方案”查看推荐方案。".into();
    }

    for leg in [Leg::Flight, Leg::Hotel] {
        let booking = state.booking.leg(leg);
        if booking.is_done() {
            continue;
        }
        let label = leg.label();
        if let Some(selection) = booking.selection().filter(|_| booking.is_locked()) {
            return format!("{label} {} 已锁定，回复“支付{label}”完成支付。", selection.token);
        }
        let presented = state.presented.options(leg);
        let prefix = leg.token_prefix();
        if !presented.is_empty() {
            return format!("回复 {prefix}1 到 {prefix}{} 选择{label}。", presented.len());
        }
        let skip = match leg {
            Leg::Flight => "",
            Leg::Hotel => "如果不需要酒店，回复“不订酒店”即可。",
        };
        return format!("下一步：回复“订{label}”搜索{label}。{skip}");
    }
    "机票和酒店都已处理完毕，回复“行程单”查看完整行程。".into()
}
