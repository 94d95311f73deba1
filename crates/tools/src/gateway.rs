//! The single boundary nodes use to reach tool collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use waypoint_config::ToolsConfig;
use waypoint_core::error::ToolError;
use waypoint_core::event::{DomainEvent, EventBus};
use waypoint_core::tool::{ToolCall, ToolRegistry, ToolResult};

/// Calls tools with normalized arguments under a per-call timeout.
#[derive(Clone)]
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    events: Option<Arc<EventBus>>,
}

impl ToolGateway {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout,
            events: None,
        }
    }

    /// Gateway over the built-in tools with the configured timeout.
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(crate::default_registry(), Duration::from_secs(config.timeout_secs))
    }

    /// Publish a `ToolExecuted` event for every call.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one tool call. Expiry of the timeout is reported as
    /// [`ToolError::Timeout`]; the call's future is dropped.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let call = ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            arguments: normalize(arguments),
        };
        debug!(tool = name, call_id = %call.id, args = %call.arguments, "Calling tool");

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.registry.execute(&call)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => debug!(tool = name, duration_ms, success = result.success, "Tool finished"),
            Err(e) => warn!(tool = name, duration_ms, error = %e, "Tool failed"),
        }
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success: outcome.as_ref().is_ok_and(|r| r.success),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }
        outcome
    }
}

/// Trim string arguments so collaborators never see stray whitespace.
fn normalize(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, serde_json::Value::String(s.trim().to_string())),
                    other => (k, other),
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use waypoint_core::tool::Tool;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its arguments"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::from_data(arguments))
        }
    }

    struct Stuck;

    #[async_trait]
    impl Tool for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }
        fn description(&self) -> &str {
            "Never answers"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            std::future::pending().await
        }
    }

    fn gateway(timeout: Duration) -> ToolGateway {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(Stuck));
        ToolGateway::new(registry, timeout)
    }

    #[tokio::test]
    async fn trims_string_arguments() {
        let result = gateway(Duration::from_secs(1))
            .call("echo", serde_json::json!({"city": "  东京 ", "nights": 3}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["city"], "东京");
        assert_eq!(data["nights"], 3);
        assert!(!result.call_id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_tool_error() {
        let err = gateway(Duration::from_secs(2))
            .call("stuck", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { ref tool_name, timeout_secs: 2 } if tool_name == "stuck"));
    }

    #[tokio::test]
    async fn publishes_tool_events() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let gw = gateway(Duration::from_secs(1)).with_event_bus(bus);

        gw.call("echo", serde_json::json!({})).await.unwrap();
        assert!(gw.call("missing", serde_json::json!({})).await.is_err());

        let first = rx.recv().await.unwrap();
        assert!(matches!(&*first, DomainEvent::ToolExecuted { tool_name, success: true, .. } if tool_name == "echo"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(&*second, DomainEvent::ToolExecuted { success: false, .. }));
    }

    #[tokio::test]
    async fn built_in_gateway_uses_config_timeout() {
        let gw = ToolGateway::from_config(&ToolsConfig::default());
        assert_eq!(gw.timeout(), Duration::from_secs(10));
        assert_eq!(gw.registry().len(), 5);
    }
}
