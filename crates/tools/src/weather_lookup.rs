//! Weather lookup tool - stub that returns a deterministic forecast.
//!
//! The stub keeps the booking flow testable end to end without network
//! access. Output is a plausible daily forecast for the city and date.

use async_trait::async_trait;
use chrono::NaiveDate;
use waypoint_core::error::ToolError;
use waypoint_core::geo;
use waypoint_core::tool::{Tool, ToolResult};

use crate::{required_str, seed};

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up the forecast for a city on a date. Returns conditions, high/low in °C, humidity and a packing tip."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name to look up weather for"
                },
                "date": {
                    "type": "string",
                    "description": "Forecast date, YYYY-MM-DD (default: today)"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let location = required_str(&arguments, "location")?;
        let date = match arguments.get("date").and_then(|d| d.as_str()) {
            None => None,
            Some(d) => Some(NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
                ToolError::InvalidArguments(format!("'date' must be YYYY-MM-DD, got '{d}'"))
            })?),
        };

        let name = geo::resolve(location).map_or(location, |c| c.zh);
        let date_str = date.map(|d| d.format("%Y-%m-%d").to_string());
        let forecast = forecast(name, date_str.as_deref());
        Ok(ToolResult::from_data(
            serde_json::to_value(&forecast).unwrap_or_default(),
        ))
    }
}

#[derive(serde::Serialize)]
struct Forecast {
    location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    conditions: &'static str,
    high_c: i32,
    low_c: i32,
    humidity: u32,
    tip: &'static str,
}

const CONDITIONS: &[&str] = &["晴", "多云", "阴", "小雨", "中雨", "雷阵雨", "小雪", "雾"];

/// Deterministic forecast derived from the location and date.
fn forecast(location: &str, date: Option<&str>) -> Forecast {
    let h = seed(&[location, date.unwrap_or("")]);
    let high_c = (h % 30) as i32 + 2;
    let low_c = high_c - 4 - (h / 31 % 6) as i32;
    let conditions = CONDITIONS[(h as usize / 7) % CONDITIONS.len()];
    let tip = match conditions {
        "小雨" | "中雨" | "雷阵雨" => "记得带伞",
        "小雪" => "注意保暖，路面湿滑",
        _ if high_c >= 28 => "注意防晒补水",
        _ if low_c <= 5 => "早晚温差大，带件厚外套",
        _ => "适合出行",
    };
    Forecast {
        location: location.to_string(),
        date: date.map(str::to_string),
        conditions,
        high_c,
        low_c,
        humidity: 30 + (h % 60),
        tip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_forecast() {
        let result = WeatherLookupTool
            .execute(serde_json::json!({"location": "Tokyo", "date": "2026-10-30"}))
            .await
            .unwrap();

        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["location"], "东京");
        assert_eq!(data["date"], "2026-10-30");
        assert!(data["high_c"].as_i64().unwrap() > data["low_c"].as_i64().unwrap());
    }

    #[tokio::test]
    async fn deterministic_results() {
        let r1 = WeatherLookupTool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();
        let r2 = WeatherLookupTool
            .execute(serde_json::json!({"location": "伦敦"}))
            .await
            .unwrap();
        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn bad_input_returns_error() {
        assert!(WeatherLookupTool.execute(serde_json::json!({})).await.is_err());
        assert!(WeatherLookupTool
            .execute(serde_json::json!({"location": "Tokyo", "date": "soon"}))
            .await
            .is_err());
    }

    #[test]
    fn tool_definition() {
        assert_eq!(WeatherLookupTool.to_definition().name, "weather_lookup");
    }
}
