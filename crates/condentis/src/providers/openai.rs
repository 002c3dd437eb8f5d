use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{future, StreamExt};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{ChatChunk, ChunkStream, Provider};
use super::configs::OpenAiProviderConfig;
use super::errors::ProviderError;
use super::utils::{
    messages_to_openai_spec, openai_chunk_to_chat_chunk, openai_response_to_chat_chunk,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn build_payload(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
        stream: bool,
    ) -> Result<Value, ProviderError> {
        let messages_spec =
            messages_to_openai_spec(messages).map_err(|e| ProviderError::rejected(e.to_string()))?;
        let tools_spec =
            tools_to_openai_spec(tools).map_err(|e| ProviderError::rejected(e.to_string()))?;

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_spec,
            "stream": stream,
        });

        if stream {
            payload["stream_options"] = json!({"include_usage": true});
        }
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        Ok(payload)
    }

    async fn post(&self, payload: Value) -> Result<Response, ProviderError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::from_status(status, &body))
        }
    }
}

/// A mid-stream `{"error": ...}` payload.
fn stream_payload_error(data: &Value) -> Option<ProviderError> {
    let error = data.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| error.to_string());
    Some(ProviderError::other(format!("Provider error: {}", message)))
}

fn decode_event_data(data: &str) -> Result<ChatChunk, ProviderError> {
    let value: Value = serde_json::from_str(data)?;
    match stream_payload_error(&value) {
        Some(err) => Err(err),
        None => Ok(openai_chunk_to_chat_chunk(&value)),
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<ChunkStream, ProviderError> {
        let payload = self.build_payload(messages, tools, true)?;
        let response = self.post(payload).await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(event) if event.data.trim() == "[DONE]"))
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(decode_event_data(&event.data)),
                    Err(EventStreamError::Transport(e)) => Some(Err(ProviderError::from(e))),
                    Err(e) => Some(Err(ProviderError::other(format!("Malformed event stream: {}", e)))),
                }
            });

        Ok(Box::pin(chunks))
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<ChatChunk, ProviderError> {
        let payload = self.build_payload(messages, tools, false)?;
        let response = self.post(payload).await?;
        let body: Value = response.json().await?;

        if let Some(err) = stream_payload_error(&body) {
            return Err(err);
        }
        openai_response_to_chat_chunk(&body).map_err(|e| ProviderError::other(e.to_string()))
    }
}
