use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use super::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cached_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
            cached_tokens: self.cached_tokens + other.cached_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: TokenUsage) {
        *self = *self + other;
    }
}

/// One piece of a tool call as delivered by the transport. Fragments of the
/// same call share `index`; `id` and `name` usually only arrive on the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments<S: Into<String>>(mut self, arguments: S) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// A partial response. A non-streaming response is a single chunk holding
/// the whole message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

impl ChatChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            tool_calls: vec![fragment],
            ..Default::default()
        }
    }

    pub fn finish<S: Into<String>>(reason: S) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Chunks of one network exchange. Dropping the stream releases the
/// underlying connection.
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ProviderError>>;

/// Base trait for AI providers (OpenAI and compatible endpoints)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a streaming exchange for the given conversation
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<ChunkStream, ProviderError>;

    /// Request the whole reply at once
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<ChatChunk, ProviderError>;
}
