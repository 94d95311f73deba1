use async_trait::async_trait;
use serde_json::{json, Value};
use waypoint_core::{Leg, NodeId, NodeResult, PresentedOption};

use super::{city_zh, option_payloads, select_control, Next, Node, NodeContext, NodeError};

/// Looks up inventory for one leg and presents it under `F1..` / `H1..`.
pub struct SearchNode {
    leg: Leg,
}

impl SearchNode {
    pub fn new(leg: Leg) -> Self {
        Self { leg }
    }
}

#[async_trait]
impl Node for SearchNode {
    fn id(&self) -> NodeId {
        match self.leg {
            Leg::Flight => NodeId::SearchFlight,
            Leg::Hotel => NodeId::SearchHotel,
        }
    }

    async fn run(&self, ctx: &mut NodeContext<'_>) -> Result<Next, NodeError> {
        if let Some(tier) = ctx.services.lexicon.tier(ctx.message) {
            ctx.state.chosen_plan = Some(tier);
        }

        let booking = ctx.state.booking.leg(self.leg);
        if booking.is_paid() {
            let order_id = booking.order_id().unwrap_or_default().to_string();
            ctx.say(&format!("{}已经支付（订单号 {order_id}），无需重新搜索。", self.leg.label()))
                .await?;
            return Ok(Next::Wait);
        }

        let slots = ctx.state.slots.clone();
        let (Some(origin), Some(destination), Some(date)) = (slots.origin, slots.destination, slots.date) else {
            return Err(NodeError::Internal(format!("{} entered with incomplete slots", self.id())));
        };
        let tier = ctx.state.chosen_plan;
        let date = date.format("%Y-%m-%d").to_string();

        ctx.status(&format!("正在查询{}", self.leg.label())).await?;
        let options = match self.leg {
            Leg::Flight => {
                let from = ctx.airport_code(&origin).await?;
                let to = ctx.airport_code(&destination).await?;
                let data = ctx
                    .call_tool(
                        "flight_search",
                        json!({ "origin": from, "destination": to, "date": date, "tier": tier }),
                    )
                    .await?;
                flight_options(&data)
            }
            Leg::Hotel => {
                let code = ctx.airport_code(&destination).await?;
                let nights = ctx.services.config.tools.hotel_nights;
                let data = ctx
                    .call_tool(
                        "hotel_search",
                        json!({ "city_code": code, "check_in": date, "nights": nights, "tier": tier }),
                    )
                    .await?;
                hotel_options(&data)
            }
        };

        if options.is_empty() {
            ctx.say(&format!("没有找到合适的{}，换个日期试试？", self.leg.label())).await?;
            return Ok(Next::Wait);
        }

        let mut text = match self.leg {
            Leg::Flight => format!("{} → {} 的航班：\n", city_zh(&origin), city_zh(&destination)),
            Leg::Hotel => format!("{}的酒店：\n", city_zh(&destination)),
        };
        for option in &options {
            text.push_str(&format!("{} {} ¥{}\n", option.token, option.title, option.price));
        }
        text.push_str(&format!(
            "回复编号（如 {}1）选择{}。",
            self.leg.token_prefix(),
            self.leg.label()
        ));
        ctx.say(&text).await?;

        ctx.control(select_control(self.leg), option_payloads(&options));
        ctx.record(NodeResult::json(self.id(), json!({ "presented": option_payloads(&options) })));
        ctx.state.present(self.leg, options);
        Ok(Next::Wait)
    }
}

fn flight_options(data: &Value) -> Vec<PresentedOption> {
    rows(data, "flights")
        .enumerate()
        .map(|(i, f)| PresentedOption {
            token: format!("F{}", i + 1),
            title: format!(
                "{} {} {}-{}",
                f["flight_no"].as_str().unwrap_or_default(),
                f["airline"].as_str().unwrap_or_default(),
                f["depart"].as_str().unwrap_or_default(),
                f["arrive"].as_str().unwrap_or_default(),
            ),
            price: price(&f["price"]),
            detail: f.clone(),
        })
        .collect()
}

fn hotel_options(data: &Value) -> Vec<PresentedOption> {
    rows(data, "hotels")
        .enumerate()
        .map(|(i, h)| PresentedOption {
            token: format!("H{}", i + 1),
            title: format!(
                "{} {}★ {}（{}晚）",
                h["name"].as_str().unwrap_or_default(),
                h["stars"].as_u64().unwrap_or_default(),
                h["area"].as_str().unwrap_or_default(),
                data["nights"].as_u64().unwrap_or_default(),
            ),
            price: price(&h["total_price"]),
            detail: h.clone(),
        })
        .collect()
}

fn rows<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data[key].as_array().into_iter().flatten()
}

fn price(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or_default()
}
