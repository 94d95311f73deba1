//! Hotel search tool - deterministic offline inventory.

use async_trait::async_trait;
use chrono::Duration;
use waypoint_core::error::ToolError;
use waypoint_core::geo;
use waypoint_core::tool::{Tool, ToolResult};
use waypoint_core::PlanTier;

use crate::{optional_tier, required_date, required_str, seed};

pub struct HotelSearchTool;

#[async_trait]
impl Tool for HotelSearchTool {
    fn name(&self) -> &str {
        "hotel_search"
    }

    fn description(&self) -> &str {
        "Search hotels in a city for a stay. Returns name, stars, area and total price in CNY."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city_code": { "type": "string", "description": "IATA code of the city's airport" },
                "check_in": { "type": "string", "description": "Check-in date, YYYY-MM-DD" },
                "nights": { "type": "integer", "description": "Number of nights (default 3)", "default": 3 },
                "tier": {
                    "type": "string",
                    "enum": ["economy", "luxury", "family"],
                    "description": "Plan tier; without it the results span all tiers"
                }
            },
            "required": ["city_code", "check_in"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = required_str(&arguments, "city_code")?.to_ascii_uppercase();
        let check_in = required_date(&arguments, "check_in")?;
        let nights = match arguments.get("nights") {
            None => 3,
            Some(n) => n
                .as_u64()
                .filter(|n| (1..=30).contains(n))
                .ok_or_else(|| ToolError::InvalidArguments("'nights' must be 1-30".into()))?
                as u32,
        };
        let tier = optional_tier(&arguments)?;

        let city = geo::CITIES
            .iter()
            .find(|c| c.airport == code)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "hotel_search".into(),
                reason: format!("no hotels indexed for {code}"),
            })?;

        let check_in_str = check_in.format("%Y-%m-%d").to_string();
        let check_out = (check_in + Duration::days(i64::from(nights)))
            .format("%Y-%m-%d")
            .to_string();
        let hotels = inventory(city, &check_in_str, nights, tier);

        Ok(ToolResult::from_data(serde_json::json!({
            "city": city.name,
            "check_in": check_in_str,
            "check_out": check_out,
            "nights": nights,
            "hotels": hotels,
        })))
    }
}

#[derive(serde::Serialize)]
struct Hotel {
    name: String,
    stars: u8,
    area: &'static str,
    nightly_price: u32,
    total_price: u32,
}

const AREAS: &[&str] = &["市中心", "商业区", "老城区", "机场附近", "海滨"];

const ECONOMY_BRANDS: &[&str] = &["如家精选", "全季", "汉庭"];
const FAMILY_BRANDS: &[&str] = &["亚朵", "假日", "诺富特"];
const LUXURY_BRANDS: &[&str] = &["丽思卡尔顿", "半岛", "安缦"];

/// Brands, stars, nightly floor and nightly spread per tier.
fn brands(tier: PlanTier) -> (&'static [&'static str], u8, u32, u32) {
    match tier {
        PlanTier::Economy => (ECONOMY_BRANDS, 3, 260, 300),
        PlanTier::Family => (FAMILY_BRANDS, 4, 620, 400),
        PlanTier::Luxury => (LUXURY_BRANDS, 5, 1900, 1200),
    }
}

fn inventory(city: &geo::City, check_in: &str, nights: u32, tier: Option<PlanTier>) -> Vec<Hotel> {
    let h = seed(&[city.airport, check_in]);
    let tiers = match tier {
        Some(t) => [t; 3],
        None => PlanTier::ALL,
    };
    tiers
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let hi = h.rotate_left(i as u32 * 5);
            let (names, stars, floor, spread) = brands(t);
            let nightly = floor + hi % spread;
            Hotel {
                name: format!("{}{}酒店", city.zh, names[(hi as usize + i) % names.len()]),
                stars,
                area: AREAS[(hi as usize / 3) % AREAS.len()],
                nightly_price: nightly,
                total_price: nightly * nights,
            }
        })
        .collect()
}
