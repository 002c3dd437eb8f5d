use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;
use crate::providers::base::{ChatChunk, ChunkStream, Provider};
use crate::providers::errors::ProviderError;

/// One scripted exchange.
pub enum Exchange {
    /// The request is accepted and these items are streamed.
    Chunks(Vec<Result<ChatChunk, ProviderError>>),
    /// The items are streamed, then the stream never ends.
    Stall(Vec<Result<ChatChunk, ProviderError>>),
    /// The request itself fails.
    Fail(ProviderError),
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Released when the chunk stream holding it is dropped.
struct Connection(Arc<Counters>);

impl Drop for Connection {
    fn drop(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mock provider that replays pre-configured exchanges for testing
pub struct MockProvider {
    script: Mutex<VecDeque<Exchange>>,
    counters: Arc<Counters>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of exchanges
    pub fn new(script: Vec<Exchange>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            counters: Arc::new(Counters::default()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script of successful exchanges.
    pub fn with_chunks(exchanges: Vec<Vec<ChatChunk>>) -> Self {
        Self::new(
            exchanges
                .into_iter()
                .map(|chunks| Exchange::Chunks(chunks.into_iter().map(Ok).collect()))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Messages sent with every request so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_exchange(&self, messages: &[Message]) -> Exchange {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            // Return an empty reply once the script runs out
            .unwrap_or_else(|| Exchange::Chunks(Vec::new()))
    }

    fn open(&self) -> Connection {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Connection(Arc::clone(&self.counters))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        messages: &[Message],
        _tools: &[ToolDeclaration],
    ) -> Result<ChunkStream, ProviderError> {
        let (items, stall) = match self.next_exchange(messages) {
            Exchange::Fail(err) => return Err(err),
            Exchange::Chunks(items) => (items, false),
            Exchange::Stall(items) => (items, true),
        };

        let connection = self.open();
        let items = stream::iter(items);
        let chunks = if stall {
            items.chain(stream::pending()).boxed()
        } else {
            items.boxed()
        };
        Ok(chunks
            .map(move |item| {
                let _held = &connection;
                item
            })
            .boxed())
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDeclaration],
    ) -> Result<ChatChunk, ProviderError> {
        let items = match self.next_exchange(messages) {
            Exchange::Fail(err) => return Err(err),
            Exchange::Chunks(items) | Exchange::Stall(items) => items,
        };

        let mut response = ChatChunk::default();
        for item in items {
            let chunk = item?;
            if let Some(text) = chunk.text {
                response.text.get_or_insert_with(String::new).push_str(&text);
            }
            response.tool_calls.extend(chunk.tool_calls);
            response.usage = chunk.usage.or(response.usage);
            response.finish_reason = chunk.finish_reason.or(response.finish_reason);
        }
        Ok(response)
    }
}
