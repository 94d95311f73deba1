//! Flight search tool - deterministic offline schedule.
//!
//! Returns three plausible flights for a route and date. Prices and times
//! are derived from a hash of the request, so the same query always yields
//! the same options and tests can rely on them.

use async_trait::async_trait;
use waypoint_core::error::ToolError;
use waypoint_core::geo;
use waypoint_core::tool::{Tool, ToolResult};
use waypoint_core::PlanTier;

use crate::{optional_tier, required_date, required_str, seed};

pub struct FlightSearchTool;

#[async_trait]
impl Tool for FlightSearchTool {
    fn name(&self) -> &str {
        "flight_search"
    }

    fn description(&self) -> &str {
        "Search flights between two airports on a date. Returns flight number, times, cabin and price in CNY."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "origin": { "type": "string", "description": "Origin IATA airport code" },
                "destination": { "type": "string", "description": "Destination IATA airport code" },
                "date": { "type": "string", "description": "Departure date, YYYY-MM-DD" },
                "tier": {
                    "type": "string",
                    "enum": ["economy", "luxury", "family"],
                    "description": "Plan tier the cabin is chosen for (default: economy)"
                }
            },
            "required": ["origin", "destination", "date"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let origin = required_str(&arguments, "origin")?.to_ascii_uppercase();
        let destination = required_str(&arguments, "destination")?.to_ascii_uppercase();
        let date = required_date(&arguments, "date")?;
        let tier = optional_tier(&arguments)?.unwrap_or(PlanTier::Economy);

        let no_route = |reason: String| ToolError::ExecutionFailed {
            tool_name: "flight_search".into(),
            reason,
        };
        let from = airport_city(&origin).ok_or_else(|| no_route(format!("unknown airport {origin}")))?;
        let to = airport_city(&destination)
            .ok_or_else(|| no_route(format!("unknown airport {destination}")))?;
        if origin == destination {
            return Err(no_route(format!("origin and destination are both {origin}")));
        }

        let domestic = from.is_domestic() && to.is_domestic();
        let date_str = date.format("%Y-%m-%d").to_string();
        let flights = schedule(&origin, &destination, &date_str, domestic, tier);

        Ok(ToolResult::from_data(serde_json::json!({
            "origin": origin,
            "destination": destination,
            "date": date_str,
            "cabin": cabin(tier),
            "flights": flights,
        })))
    }
}

#[derive(serde::Serialize)]
struct Flight {
    flight_no: String,
    airline: &'static str,
    depart: String,
    arrive: String,
    duration_min: u32,
    cabin: &'static str,
    price: u32,
}

const AIRLINES: &[(&str, &str)] = &[
    ("MU", "东方航空"),
    ("CA", "中国国际航空"),
    ("CZ", "南方航空"),
    ("HO", "吉祥航空"),
    ("NH", "全日空"),
];

const DEPARTURES: [(u32, u32); 3] = [(8, 5), (13, 20), (19, 45)];

fn airport_city(code: &str) -> Option<&'static geo::City> {
    geo::CITIES.iter().find(|c| c.airport == code)
}

fn cabin(tier: PlanTier) -> &'static str {
    match tier {
        PlanTier::Luxury => "商务舱",
        PlanTier::Economy | PlanTier::Family => "经济舱",
    }
}

fn schedule(origin: &str, destination: &str, date: &str, domestic: bool, tier: PlanTier) -> Vec<Flight> {
    let h = seed(&[origin, destination, date]);
    let base = if domestic { 700 + h % 800 } else { 1800 + h % 1400 };
    let duration = if domestic { 110 + h % 100 } else { 160 + h % 300 };

    DEPARTURES
        .iter()
        .enumerate()
        .map(|(i, &(hour, minute))| {
            let hi = h.rotate_left(i as u32 * 7);
            let (code, airline) = AIRLINES[(hi as usize) % AIRLINES.len()];
            let economy = base * [100, 115, 92][i] / 100 + hi % 200;
            let price = match tier {
                PlanTier::Luxury => economy * 16 / 5,
                PlanTier::Economy | PlanTier::Family => economy,
            };
            let minute = minute + hi % 10;
            let duration_min = duration + (hi % 4) * 5;
            Flight {
                flight_no: format!("{code}{}", 100 + hi % 900),
                airline,
                depart: clock(hour * 60 + minute),
                arrive: clock(hour * 60 + minute + duration_min),
                duration_min,
                cabin: cabin(tier),
                price,
            }
        })
        .collect()
}

/// Minutes since midnight → `HH:MM`, with `+1` past midnight.
fn clock(minutes: u32) -> String {
    let day = minutes / (24 * 60);
    let m = minutes % (24 * 60);
    let text = format!("{:02}:{:02}", m / 60, m % 60);
    if day > 0 { format!("{text}+{day}") } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tier: Option<&str>) -> serde_json::Value {
        let mut a = serde_json::json!({"origin": "PVG", "destination": "NRT", "date": "2026-10-30"});
        if let Some(t) = tier {
            a["tier"] = t.into();
        }
        a
    }

    #[tokio::test]
    async fn returns_three_flights() {
        let result = FlightSearchTool.execute(args(None)).await.unwrap();
        let data = result.data.unwrap();
        let flights = data["flights"].as_array().unwrap();
        assert_eq!(flights.len(), 3);
        assert_eq!(data["cabin"], "经济舱");
        for f in flights {
            assert!(f["price"].as_u64().unwrap() < 5000);
        }
    }

    #[tokio::test]
    async fn luxury_is_business_class_and_dearer() {
        let economy = FlightSearchTool.execute(args(None)).await.unwrap().data.unwrap();
        let luxury = FlightSearchTool.execute(args(Some("luxury"))).await.unwrap().data.unwrap();
        assert_eq!(luxury["cabin"], "商务舱");
        let e = economy["flights"][0]["price"].as_u64().unwrap();
        let l = luxury["flights"][0]["price"].as_u64().unwrap();
        assert!(l > 5000);
        assert!(l > e);
    }

    #[tokio::test]
    async fn deterministic_results() {
        let r1 = FlightSearchTool.execute(args(None)).await.unwrap();
        let r2 = FlightSearchTool.execute(args(None)).await.unwrap();
        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn bad_arguments() {
        let bad_date = serde_json::json!({"origin": "PVG", "destination": "NRT", "date": "next friday"});
        assert!(matches!(
            FlightSearchTool.execute(bad_date).await,
            Err(ToolError::InvalidArguments(_))
        ));
        let same = serde_json::json!({"origin": "PVG", "destination": "pvg", "date": "2026-10-30"});
        assert!(matches!(
            FlightSearchTool.execute(same).await,
            Err(ToolError::ExecutionFailed { .. })
        ));
    }

    #[test]
    fn clock_wraps_past_midnight() {
        assert_eq!(clock(8 * 60 + 5), "08:05");
        assert_eq!(clock(23 * 60 + 50 + 30), "00:20+1");
    }
}
