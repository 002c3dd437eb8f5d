use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// A tool as declared to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// `{"type": "object", "properties": ..., "required": ...}`
    pub parameters: Value,
}

impl ToolDeclaration {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDeclaration {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call requested by the model, with its arguments already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Opaque identifier assigned by the provider
    pub call_id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The parsed arguments, always a JSON object
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, S: Into<String>>(call_id: I, name: S, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

// Serialized in the provider's wire shape, where arguments travel as text.
impl Serialize for ToolCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ToolCall", 3)?;
        state.serialize_field("id", &self.call_id)?;
        state.serialize_field("type", "function")?;
        state.serialize_field(
            "function",
            &json!({
                "name": self.name,
                "arguments": self.arguments.to_string(),
            }),
        )?;
        state.end()
    }
}
