use async_trait::async_trait;
use tracing::info;
use waypoint_core::{NodeId, SlotName};

use super::{city_zh, describe_date, Next, Node, NodeContext, NodeError};
use crate::nlu::{Problem, Unresolved};

/// Fills the trip slots and hands over to planning once all three are known.
pub struct CollectNode;

#[async_trait]
impl Node for CollectNode {
    fn id(&self) -> NodeId {
        NodeId::Collect
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        let extraction = ctx.services.lexicon.extract_slots(ctx.message, ctx.today());
        let before = ctx.state.slots.clone();

        let slots = &mut ctx.state.slots;
        if let Some(origin) = extraction.origin {
            slots.origin = Some(origin);
        }
        if let Some(destination) = extraction.destination {
            slots.destination = Some(destination);
        }
        if let Some(date) = extraction.date {
            slots.date = Some(date);
        }
        let changed = ctx.state.slots != before;

        let planned = !ctx.state.plan_options.is_empty()
            || !ctx.state.presented.flights.is_empty()
            || !ctx.state.presented.hotels.is_empty();
        if changed && planned {
            info!(thread = %ctx.state.thread_id, "Trip changed, dropping stale plans");
            ctx.state.invalidate_plans();
            ctx.say("行程信息已更新，之前的方案和未支付的选择已失效。").await?;
        }

        if !extraction.unresolved.is_empty() {
            let asks: Vec<String> = extraction.unresolved.iter().map(ask_again).collect();
            ctx.say(&asks.join("")).await?;
            return Ok(Next::Wait);
        }

        let slots = &mut ctx.state.slots;
        if slots.origin.is_some() && slots.origin == slots.destination {
            slots.destination = None;
            ctx.say("出发城市和目的地不能相同，请问你要去哪里？").await?;
            return Ok(Next::Wait);
        }

        let missing = ctx.state.slots.missing();
        if !missing.is_empty() {
            let labels: Vec<&str> = missing.iter().map(SlotName::label).collect();
            let known = known_slots(ctx);
            let prefix = if known.is_empty() {
                String::new()
            } else {
                format!("已记录：{}。", known.join("，"))
            };
            ctx.say(&format!("{prefix}请告诉我{}。", labels.join("、"))).await?;
            return Ok(Next::Wait);
        }

        let summary = known_slots(ctx).join("，");
        if !changed && !ctx.state.plan_options.is_empty() {
            ctx.say(&format!(
                "行程信息没有变化（{summary}）。回复 P1-P3 选择方案，或告诉我要修改的内容。"
            ))
            .await?;
            return Ok(Next::Wait);
        }

        ctx.say(&format!("好的，{summary}。正在为你生成方案。")).await?;
        Ok(Next::Goto(NodeId::Plan))
    }
}

fn known_slots(ctx: &NodeContext<'_>) -> Vec<String> {
    let slots = &ctx.state.slots;
    let mut known = Vec::new();
    if let Some(origin) = &slots.origin {
        known.push(format!("从{}出发", city_zh(origin)));
    }
    if let Some(destination) = &slots.destination {
        known.push(format!("去{}", city_zh(destination)));
    }
    if let Some(date) = slots.date {
        known.push(describe_date(date));
    }
    known
}

fn ask_again(unresolved: &Unresolved) -> String {
    let raw = &unresolved.raw;
    match unresolved.problem {
        Problem::UnknownCity => format!(
            "暂时找不到「{raw}」，请换个说法告诉我{}。",
            unresolved.slot.label()
        ),
        Problem::PastDate => format!("{raw} 已经过去了，请重新告诉我出发日期。"),
        Problem::InvalidDate => format!("「{raw}」不是有效的日期，请重新告诉我出发日期。"),
    }
}
