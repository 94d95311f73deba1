//! Travel tool collaborators for Waypoint.
//!
//! Tools give the booking nodes their view of the world: airport codes,
//! flight and hotel inventory, weather and travel guides. The built-ins are
//! deterministic offline stand-ins; real API wrappers implement the same
//! [`Tool`](waypoint_core::Tool) trait.
//!
//! Nodes never call a tool directly. They go through [`ToolGateway`], which
//! normalizes arguments, applies the per-call timeout and reports each call
//! on the event bus.

pub mod airport_lookup;
pub mod flight_search;
mod gateway;
pub mod hotel_search;
pub mod weather_lookup;
pub mod web_search;

use chrono::NaiveDate;
use waypoint_core::error::ToolError;
use waypoint_core::tool::ToolRegistry;
use waypoint_core::PlanTier;

pub use gateway::ToolGateway;

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(airport_lookup::AirportLookupTool));
    registry.register(Box::new(flight_search::FlightSearchTool));
    registry.register(Box::new(hotel_search::HotelSearchTool));
    registry.register(Box::new(weather_lookup::WeatherLookupTool));
    registry.register(Box::new(web_search::WebSearchTool));
    registry
}

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn required_date(arguments: &serde_json::Value, key: &str) -> Result<NaiveDate, ToolError> {
    let raw = required_str(arguments, key)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidArguments(format!("'{key}' must be YYYY-MM-DD, got '{raw}'")))
}

fn optional_tier(arguments: &serde_json::Value) -> Result<Option<PlanTier>, ToolError> {
    match arguments.get("tier") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|_| ToolError::InvalidArguments(format!("unknown tier {v}"))),
    }
}

/// Stable hash used by the offline tools to vary their answers.
fn seed(parts: &[&str]) -> u32 {
    parts.iter().flat_map(|p| p.bytes().chain([0])).fold(2_166_136_261u32, |acc, b| {
        (acc ^ u32::from(b)).wrapping_mul(16_777_619)
    })
}
