use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;

use super::accumulator::ToolCallAccumulator;
use super::base::{ChatChunk, ChunkStream, Provider, TokenUsage};
use super::errors::ProviderError;
use super::events::{StreamError, StreamEvent};
use super::retry::{RetryDecision, RetryPolicy};
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolDeclaration};

/// The connection held by one attempt. Dropping the scope drops the chunk
/// stream, which releases the connection, on every exit path.
struct ConnectionScope {
    chunks: ChunkStream,
    attempt: u32,
}

impl ConnectionScope {
    fn open(chunks: ChunkStream, attempt: u32) -> Self {
        tracing::debug!(attempt, "provider connection opened");
        Self { chunks, attempt }
    }

    async fn next(&mut self) -> Option<Result<ChatChunk, ProviderError>> {
        self.chunks.next().await
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        tracing::debug!(attempt = self.attempt, "provider connection released");
    }
}

/// A whole reply obtained without streaming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedMessage {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Calls whose arguments could not be parsed. They are not in `tool_calls`.
    pub tool_errors: Vec<StreamError>,
    /// Unclassified failures of earlier attempts that were retried.
    pub errors: Vec<StreamError>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Turns provider exchanges into [`StreamEvent`]s, assembling tool calls and
/// retrying transient failures.
pub struct StreamDecoder {
    provider: Arc<dyn Provider>,
    retry: RetryPolicy,
}

impl StreamDecoder {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Decode one reply. The returned stream is lazy: nothing is requested
    /// until it is polled, and dropping it releases the connection.
    ///
    /// A successful exchange ends with `MessageComplete`. A failed one ends
    /// with a single terminal `Error` once retries are exhausted or the
    /// failure is not retryable.
    pub fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDeclaration>,
    ) -> BoxStream<'_, StreamEvent> {
        let provider = &self.provider;
        let retry = self.retry;

        Box::pin(async_stream::stream! {
            let mut attempt: u32 = 0;
            loop {
                let failure = match provider.stream(&messages, &tools).await {
                    Err(err) => err,
                    Ok(chunks) => {
                        let mut scope = ConnectionScope::open(chunks, attempt);
                        let mut accumulator = ToolCallAccumulator::new();
                        let mut finish_reason = None;
                        let mut usage = None;
                        let mut emitted = false;
                        let mut failed = None;

                        while let Some(item) = scope.next().await {
                            let chunk = match item {
                                Ok(chunk) => chunk,
                                Err(err) => {
                                    failed = Some(err);
                                    break;
                                }
                            };

                            if let Some(text) = chunk.text {
                                emitted = true;
                                yield StreamEvent::TextDelta(text);
                            }
                            for fragment in &chunk.tool_calls {
                                for event in accumulator.ingest(fragment) {
                                    emitted = true;
                                    yield event;
                                }
                            }
                            if chunk.finish_reason.is_some() {
                                finish_reason = chunk.finish_reason;
                            }
                            if chunk.usage.is_some() {
                                usage = chunk.usage;
                            }
                        }
                        drop(scope);

                        match failed {
                            None => {
                                for event in accumulator.finish() {
                                    yield event;
                                }
                                yield StreamEvent::MessageComplete { finish_reason, usage };
                                return;
                            }
                            Some(err) if emitted => {
                                tracing::warn!(attempt, "provider stream failed after output: {}", err);
                                yield StreamEvent::Error(err.into());
                                return;
                            }
                            Some(err) => err,
                        }
                    }
                };

                match retry.decide(&failure, attempt) {
                    RetryDecision::Backoff(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying provider request: {}",
                            failure
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::ReportAndContinue => {
                        tracing::warn!(attempt, "provider request failed: {}", failure);
                        yield StreamEvent::Error(failure.into());
                    }
                    RetryDecision::Stop => {
                        tracing::warn!(attempt, "giving up on provider request: {}", failure);
                        yield StreamEvent::Error(failure.into());
                        return;
                    }
                }
                attempt += 1;
            }
        })
    }

    /// Request the whole reply in one exchange, under the same retry policy.
    pub async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<CompletedMessage, StreamError> {
        let mut attempt: u32 = 0;
        let mut errors = Vec::new();
        loop {
            let failure = match self.provider.complete(messages, tools).await {
                Ok(chunk) => {
                    return Ok(CompletedMessage {
                        errors,
                        ..resolve_completion(chunk)
                    })
                }
                Err(err) => err,
            };

            match self.retry.decide(&failure, attempt) {
                RetryDecision::Backoff(delay) => {
                    tracing::warn!(attempt, "retrying provider request: {}", failure);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::ReportAndContinue => {
                    tracing::warn!(attempt, "provider request failed: {}", failure);
                    errors.push(failure.into());
                }
                RetryDecision::Stop => return Err(failure.into()),
            }
            attempt += 1;
        }
    }
}

fn resolve_completion(chunk: ChatChunk) -> CompletedMessage {
    let mut accumulator = ToolCallAccumulator::new();
    for fragment in &chunk.tool_calls {
        accumulator.ingest(fragment);
    }

    let mut completed = CompletedMessage {
        text: chunk.text.unwrap_or_default(),
        finish_reason: chunk.finish_reason,
        usage: chunk.usage,
        ..Default::default()
    };
    for result in accumulator.into_results() {
        match result {
            Ok(call) => completed.tool_calls.push(call),
            Err(err) => completed.tool_errors.push(err),
        }
    }
    completed
}
