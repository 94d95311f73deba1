//! Travel guide search - stub that returns canned guide results.
//!
//! In production this would call a search API. The stub answers from a
//! small table of destination guides so plan generation runs offline.

use async_trait::async_trait;
use waypoint_core::error::ToolError;
use waypoint_core::geo;
use waypoint_core::tool::{Tool, ToolResult};

use crate::required_str;

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search travel guides. Returns titles, URLs, snippets and highlighted sights for the destination."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query, e.g. 东京 旅游攻略"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3, max 5)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = required_str(&arguments, "query")?;
        let count = arguments["num_results"].as_u64().unwrap_or(3).clamp(1, 5) as usize;

        let city = geo::find_mentions(query).first().map(|m| m.city);
        let sights: Vec<&str> = city.map(sights_for).unwrap_or_default().to_vec();
        let results = guides(query, city, count);

        Ok(ToolResult::from_data(serde_json::json!({
            "query": query,
            "destination": city.map(|c| c.name),
            "sights": sights,
            "results": results,
        })))
    }
}

#[derive(Clone, serde::Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

fn sights_for(city: &geo::City) -> &'static [&'static str] {
    match city.name {
        "Tokyo" => &["浅草寺", "涩谷十字路口", "上野公园", "东京塔", "筑地场外市场", "迪士尼乐园"],
        "Osaka" => &["大阪城", "道顿堀", "环球影城", "黑门市场"],
        "Kyoto" => &["伏见稻荷大社", "清水寺", "岚山竹林", "金阁寺"],
        "Seoul" => &["景福宫", "明洞", "北村韩屋村", "乐天世界"],
        "Beijing" => &["故宫", "八达岭长城", "颐和园", "南锣鼓巷"],
        "Shanghai" => &["外滩", "豫园", "迪士尼乐园", "武康路"],
        "Bangkok" => &["大皇宫", "卧佛寺", "考山路", "暹罗广场"],
        "Singapore" => &["滨海湾花园", "圣淘沙", "牛车水", "夜间动物园"],
        "Paris" => &["埃菲尔铁塔", "卢浮宫", "蒙马特高地", "塞纳河游船"],
        _ => &["老城区漫步", "当地博物馆", "特色美食街", "城市观景台"],
    }
}

fn guides(query: &str, city: Option<&geo::City>, count: usize) -> Vec<SearchResult> {
    let Some(city) = city else {
        return (0..count)
            .map(|i| SearchResult {
                title: format!("「{query}」相关攻略 {}", i + 1),
                url: format!("https://guides.example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
                snippet: format!("关于「{query}」的旅行经验与建议。"),
            })
            .collect();
    };

    let slug = city.name.to_lowercase().replace([' ', '\''], "-");
    let templates = [
        ("自由行完全攻略", "交通、住宿区域与必去景点一文看懂。"),
        ("三日游经典路线", "第一次去也不会走回头路的行程安排。"),
        ("亲子游指南", "适合带孩子的景点、餐厅和酒店推荐。"),
        ("美食地图", "当地人常去的餐馆与夜市。"),
        ("省钱小贴士", "交通卡、通票和淡旺季价格差异。"),
    ];
    templates
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (title, snippet))| SearchResult {
            title: format!("{}{}", city.zh, title),
            url: format!("https://guides.example.com/{slug}/{}", i + 1),
            snippet: snippet.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn destination_query_returns_guides_and_sights() {
        let result = WebSearchTool
            .execute(serde_json::json!({"query": "东京 旅游攻略"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["destination"], "Tokyo");
        assert_eq!(data["results"].as_array().unwrap().len(), 3);
        assert!(data["sights"].as_array().unwrap().iter().any(|s| s == "浅草寺"));
    }

    #[tokio::test]
    async fn generic_query_falls_back() {
        let result = WebSearchTool
            .execute(serde_json::json!({"query": "visa tips", "num_results": 9}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert!(data["destination"].is_null());
        assert_eq!(data["results"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn missing_query_returns_error() {
        assert!(WebSearchTool.execute(serde_json::json!({})).await.is_err());
    }
}
