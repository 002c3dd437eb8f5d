use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a provider failure is handled by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The provider asked us to slow down. Retried with backoff.
    RateLimited,
    /// The provider could not be reached or dropped the exchange. Retried with backoff.
    Connection,
    /// The provider refused the request (bad payload, auth, ...). Never retried.
    Rejected,
    /// Anything we could not classify.
    Other,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Rejected, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            429 => ProviderErrorKind::RateLimited,
            500 | 502 | 503 | 504 => ProviderErrorKind::Connection,
            _ => ProviderErrorKind::Rejected,
        };
        Self {
            kind,
            message: format!("{}: {}", status, error_message(body)),
            status: Some(status.as_u16()),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited | ProviderErrorKind::Connection
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ProviderError::from_status(status, &err.to_string());
        }
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            ProviderError::connection(err.to_string())
        } else {
            ProviderError::other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::other(format!("Invalid provider payload: {}", err))
    }
}

/// Pull `error.message` out of an OpenAI style error body, or return the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
