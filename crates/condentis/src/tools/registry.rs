use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use super::base::{Tool, ToolInvocation, ToolResult};
use super::read_file::ReadFileTool;
use crate::models::tool::ToolDeclaration;
use crate::token_counter::TokenCounter;

/// Tools available to the model, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The first registration of a name wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if self.get(tool.name()).is_some() {
            tracing::warn!("Tool {} already registered, skipping", tool.name());
            return;
        }
        tracing::debug!(kind = %tool.kind(), "Registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let Some(position) = self.tools.iter().position(|tool| tool.name() == name) else {
            tracing::warn!("Tool {} not found", name);
            return None;
        };
        tracing::debug!("Unregistered tool: {}", name);
        Some(self.tools.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|tool| tool.declaration()).collect()
    }

    /// Run `name` with `params`. Never fails: an unknown tool, invalid
    /// parameters, an execution error or a panic all come back as a failed
    /// [`ToolResult`].
    pub async fn invoke(&self, name: &str, params: Value, cwd: &Path) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!("Tool {} not found", name);
            return ToolResult::error(format!("Tool {} not found", name))
                .with_metadata("tool_name", name)
                .with_metadata("available_tools", self.names());
        };

        let violations = tool.schema().validate(&params);
        if !violations.is_empty() {
            return ToolResult::error(format!("Invalid parameters: {}", violations.join("; ")))
                .with_metadata("tool_name", name)
                .with_metadata("validation_errors", json!(violations));
        }

        let invocation = ToolInvocation::new(params, cwd);
        let failure = match AssertUnwindSafe(tool.execute(invocation)).catch_unwind().await {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic),
        };

        tracing::error!("Error invoking tool {}: {}", name, failure);
        ToolResult::error(format!("Internal error invoking tool {}: {}", name, failure))
            .with_metadata("tool_name", name)
            .with_metadata("error", failure)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

/// A registry holding every built-in tool.
pub fn default_registry(token_counter: Arc<TokenCounter>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(token_counter)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AgentError, AgentResult};
    use crate::tools::base::ToolKind;
    use crate::tools::schema::{JsonSchema, ParamsSchema};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool {
        name: &'static str,
        kind: ToolKind,
        schema: JsonSchema,
        runs: AtomicUsize,
    }

    impl EchoTool {
        fn new(name: &'static str, kind: ToolKind) -> Self {
            Self {
                name,
                kind,
                schema: JsonSchema::new(json!({
                    "type": "object",
                    "required": ["text", "times"],
                    "properties": {
                        "text": {"type": "string"},
                        "times": {"type": "integer", "minimum": 1}
                    }
                })),
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Repeat text"
        }

        fn kind(&self) -> ToolKind {
            self.kind
        }

        fn schema(&self) -> &dyn ParamsSchema {
            &self.schema
        }

        async fn execute(&self, invocation: ToolInvocation) -> AgentResult<ToolResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let text = invocation.params["text"].as_str().unwrap_or_default();
            match text {
                "fail" => Err(AgentError::ExecutionError("disk on fire".to_string())),
                "panic" => panic!("tool blew up"),
                _ => {
                    let times = invocation.params["times"].as_u64().unwrap_or(1) as usize;
                    Ok(ToolResult::success(text.repeat(times)))
                }
            }
        }
    }

    fn registry_with_echo() -> (ToolRegistry, Arc<EchoTool>) {
        let tool = Arc::new(EchoTool::new("echo", ToolKind::Read));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        (registry, tool)
    }

    #[tokio::test]
    async fn test_invoke_runs_tool() {
        let (registry, _) = registry_with_echo();
        let result = registry
            .invoke("echo", json!({"text": "ab", "times": 2}), Path::new("."))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "abab");
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (registry, _) = registry_with_echo();
        let result = registry.invoke("nope", json!({}), Path::new(".")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool nope not found"));
        assert_eq!(result.metadata["available_tools"], json!(["echo"]));
        assert_eq!(result.metadata["tool_name"], json!("nope"));
    }

    #[tokio::test]
    async fn test_invalid_params_list_every_field_and_skip_execution() {
        let (registry, tool) = registry_with_echo();
        let result = registry
            .invoke("echo", json!({"times": 0}), Path::new("."))
            .await;

        assert!(!result.success);
        let violations = result.metadata["validation_errors"].as_array().unwrap();
        assert_eq!(violations.len(), 2);
        let error = result.error.unwrap();
        assert!(error.starts_with("Invalid parameters: "));
        assert!(error.contains("Parameter text: Field required"));
        assert!(error.contains("Parameter times: Input should be greater than or equal to 1"));
        assert_eq!(tool.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execution_error_is_captured() {
        let (registry, _) = registry_with_echo();
        let result = registry
            .invoke("echo", json!({"text": "fail", "times": 1}), Path::new("."))
            .await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Internal error invoking tool echo: Tool execution failed: disk on fire")
        );
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let (registry, _) = registry_with_echo();
        let result = registry
            .invoke("echo", json!({"text": "panic", "times": 1}), Path::new("."))
            .await;
        assert!(!result.success);
        assert_eq!(result.metadata["error"], json!("tool blew up"));
    }

    #[test]
    fn test_first_registration_wins() {
        let (mut registry, _) = registry_with_echo();
        registry.register(Arc::new(EchoTool::new("echo", ToolKind::Shell)));
        assert_eq!(registry.tools().len(), 1);
        assert_eq!(registry.get("echo").unwrap().kind(), ToolKind::Read);
    }

    #[test]
    fn test_unregister() {
        let (mut registry, _) = registry_with_echo();
        assert!(registry.unregister("missing").is_none());
        assert!(registry.unregister("echo").is_some());
        assert!(registry.get("echo").is_none());
        assert!(registry.schemas().is_empty());
    }

    #[test]
    fn test_schemas_and_confirmation() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo", ToolKind::Read)));
        registry.register(Arc::new(EchoTool::new("shout", ToolKind::Write)));

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[1].name, "shout");
        assert_eq!(schemas[0].parameters["required"], json!(["text", "times"]));

        let invocation = ToolInvocation::new(json!({"text": "a", "times": 1}), ".");
        assert!(registry.get("echo").unwrap().confirmation(&invocation).is_none());
        let confirmation = registry.get("shout").unwrap().confirmation(&invocation).unwrap();
        assert_eq!(confirmation.tool_name, "shout");
        assert_eq!(confirmation.params, invocation.params);
    }

    #[test]
    fn test_default_registry_has_read_file() {
        let registry = default_registry(Arc::new(TokenCounter::new()));
        assert_eq!(registry.names(), vec!["read_file".to_string()]);
        assert!(!registry.get("read_file").unwrap().kind().is_mutating());
    }
}
