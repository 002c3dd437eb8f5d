use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configuration::Settings;
use crate::context::ContextManager;
use crate::events::AgentEvent;
use crate::models::tool::ToolCall;
use crate::prompt_template::{system_prompt, PromptContext};
use crate::providers::base::TokenUsage;
use crate::providers::decoder::StreamDecoder;
use crate::providers::events::StreamEvent;
use crate::providers::openai::OpenAiProvider;
use crate::token_counter::TokenCounter;
use crate::tools::base::ToolResult;
use crate::tools::registry::{default_registry, ToolRegistry};

/// Agent integrates a language model with the tools it may call
pub struct Agent {
    decoder: StreamDecoder,
    registry: ToolRegistry,
    context: ContextManager,
    cwd: PathBuf,
}

impl Agent {
    pub fn new(
        decoder: StreamDecoder,
        registry: ToolRegistry,
        context: ContextManager,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            decoder,
            registry,
            context,
            cwd: cwd.into(),
        }
    }

    /// An agent talking to the configured provider with the built-in tools.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let token_counter = Arc::new(match &settings.agent.tokenizer_dir {
            Some(dir) => TokenCounter::from_dir(dir.clone()),
            None => TokenCounter::new(),
        });

        let provider = OpenAiProvider::new(settings.provider_config())?;
        let decoder = StreamDecoder::new(Arc::new(provider)).with_retry(settings.retry_policy());
        let registry = default_registry(token_counter.clone());

        let cwd = settings.cwd();
        let prompt = system_prompt(&PromptContext {
            cwd: cwd.display().to_string(),
            tools: registry.schemas(),
            developer_instructions: settings.agent.developer_instructions.clone(),
            user_instructions: settings.agent.user_instructions.clone(),
        })?;
        let context =
            ContextManager::new(settings.provider.model.clone(), token_counter).with_system_prompt(prompt);

        Ok(Self::new(decoder, registry, context, cwd))
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Run one turn: a single model round trip, then every tool call it
    /// requested, in order.
    ///
    /// The stream always ends with `agent_end`. Tool results are added to the
    /// context only after every call has run; the model is not queried again.
    /// Dropping the stream mid-dispatch still answers every declared call.
    pub fn run(&mut self, message: &str) -> BoxStream<'_, AgentEvent> {
        let message = message.to_string();
        let Self {
            decoder,
            registry,
            context,
            cwd,
        } = self;

        Box::pin(async_stream::stream! {
            yield AgentEvent::agent_start(&message);
            context.add_user_message(message);

            let mut response = String::new();
            let mut pending: Vec<ToolCall> = Vec::new();
            let mut usage: Option<TokenUsage> = None;

            let mut events = decoder.stream(context.messages(), registry.schemas());
            while let Some(event) = events.next().await {
                match event {
                    StreamEvent::TextDelta(text) => {
                        response.push_str(&text);
                        yield AgentEvent::text_delta(&text);
                    }
                    StreamEvent::ToolCallComplete(call) => pending.push(call),
                    StreamEvent::MessageComplete { usage: reported, .. } => {
                        if let Some(reported) = reported {
                            *usage.get_or_insert_with(TokenUsage::default) += reported;
                        }
                    }
                    StreamEvent::Error(err) => {
                        yield AgentEvent::agent_error(&err.message, json!({"kind": err.kind}));
                    }
                    StreamEvent::ToolCallStart { name, .. } => {
                        tracing::debug!("model started tool call {}", name);
                    }
                    StreamEvent::ToolCallDelta { .. } => {}
                }
            }
            drop(events);

            context.add_assistant_message(response.clone(), pending.clone());
            let mut fold = ToolResultFold::new(context, pending.clone());
            yield AgentEvent::text_complete(&response);

            for call in &pending {
                yield AgentEvent::tool_call_start(&call.call_id, &call.name, &call.arguments);
                let result = registry
                    .invoke(&call.name, call.arguments.clone(), cwd.as_path())
                    .await;
                let complete = AgentEvent::tool_call_complete(&call.call_id, &call.name, &result);
                fold.push(result);
                yield complete;
            }
            drop(fold);

            yield AgentEvent::agent_end(Some(&response), usage);
        })
    }
}

/// Folds the results of one turn's tool calls into the context once
/// dispatch ends. Calls still without a result, because the turn was dropped
/// mid-dispatch, are answered as cancelled so every declared call has its
/// tool message.
struct ToolResultFold<'a> {
    context: &'a mut ContextManager,
    calls: Vec<ToolCall>,
    results: Vec<ToolResult>,
}

impl<'a> ToolResultFold<'a> {
    fn new(context: &'a mut ContextManager, calls: Vec<ToolCall>) -> Self {
        let results = Vec::with_capacity(calls.len());
        Self {
            context,
            calls,
            results,
        }
    }

    fn push(&mut self, result: ToolResult) {
        self.results.push(result);
    }
}

impl Drop for ToolResultFold<'_> {
    fn drop(&mut self) {
        let mut results = std::mem::take(&mut self.results).into_iter();
        for call in &self.calls {
            let result = results.next().unwrap_or_else(|| {
                tracing::debug!("tool call {} cancelled before it ran", call.call_id);
                ToolResult::error(format!("Tool call {} was cancelled", call.name))
                    .with_metadata("tool_name", call.name.as_str())
            });
            self.context
                .add_tool_result(&call.call_id, result.to_model_output(), !result.success);
        }
    }
}
