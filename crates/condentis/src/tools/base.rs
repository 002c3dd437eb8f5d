use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::schema::ParamsSchema;
use crate::errors::AgentResult;
use crate::models::tool::ToolDeclaration;

/// What a tool is able to touch. Anything but `Read` has side effects.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolKind {
    Read,
    Write,
    Shell,
    Network,
    Memory,
    Mcp,
}

impl ToolKind {
    pub fn is_mutating(self) -> bool {
        !matches!(self, ToolKind::Read)
    }
}

/// The outcome of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    pub truncated: bool,
}

impl ToolResult {
    pub fn success<S: Into<String>>(output: S) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn error<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_output<S: Into<String>>(mut self, output: S) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// The text folded back into the conversation for this result.
    pub fn to_model_output(&self) -> String {
        if self.success {
            return self.output.clone();
        }
        format!(
            "Error: {}\n\nOutput:\n{}\n",
            self.error.as_deref().unwrap_or_default(),
            self.output
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub params: Value,
    pub cwd: PathBuf,
}

impl ToolInvocation {
    pub fn new(params: Value, cwd: impl Into<PathBuf>) -> Self {
        Self {
            params,
            cwd: cwd.into(),
        }
    }
}

/// What a confirmation prompt needs to show before a mutating tool runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfirmation {
    pub tool_name: String,
    pub description: String,
    pub params: Value,
}

/// A capability the model can invoke through the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> ToolKind;

    /// Chosen once per tool; the registry validates every call against it.
    fn schema(&self) -> &dyn ParamsSchema;

    /// Run the tool. Parameters have already been validated.
    async fn execute(&self, invocation: ToolInvocation) -> AgentResult<ToolResult>;

    fn is_mutating(&self, _params: &Value) -> bool {
        self.kind().is_mutating()
    }

    /// `None` when the call can run without asking.
    fn confirmation(&self, invocation: &ToolInvocation) -> Option<ToolConfirmation> {
        if !self.is_mutating(&invocation.params) {
            return None;
        }
        Some(ToolConfirmation {
            tool_name: self.name().to_string(),
            description: self.description().to_string(),
            params: invocation.params.clone(),
        })
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(self.name(), self.description(), self.schema().parameters())
    }
}
