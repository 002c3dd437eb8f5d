use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use super::base::{ChatChunk, TokenUsage, ToolCallFragment};
use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Result<Vec<Value>> {
    messages
        .iter()
        .map(|message| serde_json::to_value(message).map_err(|e| anyhow!(e)))
        .collect()
}

/// Convert tool declarations to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[ToolDeclaration]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        if !is_valid_function_name(&tool.name) {
            return Err(anyhow!(
                "The tool name '{}' has invalid characters, it must match [a-zA-Z0-9_-]+",
                tool.name
            ));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Read a usage block, if the payload carries one.
pub fn get_usage(data: &Value) -> Option<TokenUsage> {
    let usage = data.get("usage").filter(|usage| usage.is_object())?;
    let field = |name: &str| usage.get(name).and_then(|v| v.as_u64());

    let prompt_tokens = field("prompt_tokens").unwrap_or(0);
    let completion_tokens = field("completion_tokens").unwrap_or(0);
    let total_tokens = field("total_tokens").unwrap_or(prompt_tokens + completion_tokens);
    let cached_tokens = usage
        .get("prompt_tokens_details")
        .and_then(|details| details.get("cached_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Some(TokenUsage::new(
        prompt_tokens,
        completion_tokens,
        total_tokens,
        cached_tokens,
    ))
}

/// Convert one `chat.completion.chunk` payload.
pub fn openai_chunk_to_chat_chunk(data: &Value) -> ChatChunk {
    let mut chunk = ChatChunk {
        usage: get_usage(data),
        ..Default::default()
    };

    let Some(choice) = data
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
    else {
        return chunk;
    };

    chunk.finish_reason = choice
        .get("finish_reason")
        .and_then(|reason| reason.as_str())
        .map(String::from);

    let delta = &choice["delta"];
    chunk.text = delta
        .get("content")
        .and_then(|content| content.as_str())
        .filter(|content| !content.is_empty())
        .map(String::from);
    chunk.tool_calls = tool_call_fragments(delta);
    chunk
}

/// Convert a non-streaming `chat.completion` response into a single chunk.
pub fn openai_response_to_chat_chunk(response: &Value) -> Result<ChatChunk> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| anyhow!("No choices in response"))?;
    let message = &choice["message"];

    Ok(ChatChunk {
        text: message
            .get("content")
            .and_then(|content| content.as_str())
            .filter(|content| !content.is_empty())
            .map(String::from),
        tool_calls: tool_call_fragments(message),
        usage: get_usage(response),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|reason| reason.as_str())
            .map(String::from),
    })
}

fn tool_call_fragments(delta: &Value) -> Vec<ToolCallFragment> {
    let Some(tool_calls) = delta.get("tool_calls").and_then(|calls| calls.as_array()) else {
        return Vec::new();
    };

    tool_calls
        .iter()
        .enumerate()
        .map(|(position, tool_call)| {
            let index = tool_call
                .get("index")
                .and_then(|index| index.as_u64())
                .map(|index| index as usize)
                .unwrap_or(position);
            let function = &tool_call["function"];
            ToolCallFragment {
                index,
                id: tool_call
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(String::from),
                name: function
                    .get("name")
                    .and_then(|name| name.as_str())
                    .map(String::from),
                arguments: function
                    .get("arguments")
                    .and_then(|arguments| arguments.as_str())
                    .map(String::from),
            }
        })
        .collect()
}

fn is_valid_function_name(name: &str) -> bool {
    static FUNCTION_NAME: OnceLock<Regex> = OnceLock::new();
    FUNCTION_NAME
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("function name regex must compile"))
        .is_match(name)
}
