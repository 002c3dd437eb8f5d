use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::providers::base::TokenUsage;
use crate::tools::base::ToolResult;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentEventType {
    // Agent lifecycle
    AgentStart,
    AgentEnd,
    AgentError,

    // Text streaming
    TextDelta,
    TextComplete,

    // Tool calls
    ToolCallStart,
    ToolCallComplete,
}

/// What the agent reports to its caller. Consumers key off `kind` and read
/// the documented fields of `data` for that kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventType,
    pub data: Map<String, Value>,
}

impl AgentEvent {
    fn new(kind: AgentEventType, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, data }
    }

    pub fn agent_start(message: &str) -> Self {
        Self::new(AgentEventType::AgentStart, json!({"message": message}))
    }

    pub fn agent_end(response: Option<&str>, usage: Option<TokenUsage>) -> Self {
        Self::new(
            AgentEventType::AgentEnd,
            json!({"response": response, "usage": usage}),
        )
    }

    pub fn agent_error(error: &str, details: Value) -> Self {
        Self::new(
            AgentEventType::AgentError,
            json!({"error": error, "details": details}),
        )
    }

    pub fn text_delta(content: &str) -> Self {
        Self::new(AgentEventType::TextDelta, json!({"content": content}))
    }

    pub fn text_complete(content: &str) -> Self {
        Self::new(AgentEventType::TextComplete, json!({"content": content}))
    }

    pub fn tool_call_start(call_id: &str, name: &str, arguments: &Value) -> Self {
        Self::new(
            AgentEventType::ToolCallStart,
            json!({"call_id": call_id, "name": name, "arguments": arguments}),
        )
    }

    pub fn tool_call_complete(call_id: &str, name: &str, result: &ToolResult) -> Self {
        Self::new(
            AgentEventType::ToolCallComplete,
            json!({
                "call_id": call_id,
                "name": name,
                "success": result.success,
                "output": result.output,
                "error": result.error,
                "metadata": result.metadata,
                "truncated": result.truncated,
            }),
        )
    }

    /// A string field of `data`, if present.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|value| value.as_str())
    }
}
