use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::base::TokenUsage;
use super::errors::{ProviderError, ProviderErrorKind};
use crate::models::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamErrorKind {
    RateLimited,
    Connection,
    Rejected,
    /// The accumulated arguments of a tool call were not a JSON object.
    ToolArguments,
    Other,
}

impl From<ProviderErrorKind> for StreamErrorKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::RateLimited => StreamErrorKind::RateLimited,
            ProviderErrorKind::Connection => StreamErrorKind::Connection,
            ProviderErrorKind::Rejected => StreamErrorKind::Rejected,
            ProviderErrorKind::Other => StreamErrorKind::Other,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for StreamError {
    fn from(err: ProviderError) -> Self {
        let message = match err.kind {
            ProviderErrorKind::RateLimited => format!("Rate limit exceeded: {}", err.message),
            ProviderErrorKind::Connection => format!("Connection error: {}", err.message),
            ProviderErrorKind::Rejected => format!("API error: {}", err.message),
            ProviderErrorKind::Other => err.message,
        };
        StreamError::new(err.kind.into(), message)
    }
}

/// Events decoded from one provider exchange, in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallStart {
        index: usize,
        call_id: String,
        name: String,
    },
    /// `arguments` is everything received so far for this call.
    ToolCallDelta {
        index: usize,
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    ToolCallComplete(ToolCall),
    MessageComplete {
        finish_reason: Option<String>,
        usage: Option<TokenUsage>,
    },
    Error(StreamError),
}
