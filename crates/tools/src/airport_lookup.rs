//! City → airport code lookup backed by the built-in gazetteer.

use async_trait::async_trait;
use waypoint_core::error::ToolError;
use waypoint_core::geo;
use waypoint_core::tool::{Tool, ToolResult};

use crate::required_str;

pub struct AirportLookupTool;

#[async_trait]
impl Tool for AirportLookupTool {
    fn name(&self) -> &str {
        "airport_lookup"
    }

    fn description(&self) -> &str {
        "Resolve a city name (Chinese, English or alias) to its primary IATA airport code."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, e.g. 上海 or Tokyo"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = required_str(&arguments, "city")?;
        let found = geo::resolve(city).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("unknown city '{city}'"),
        })?;

        Ok(ToolResult::from_data(serde_json::json!({
            "city": found.name,
            "city_zh": found.zh,
            "airport": found.airport,
            "country": found.country,
            "domestic": found.is_domestic(),
        })))
    }
}
