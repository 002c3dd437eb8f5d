use std::sync::Arc;

use crate::models::message::Message;
use crate::models::tool::ToolCall;
use crate::token_counter::TokenCounter;

/// The conversation sent to the model on every turn.
///
/// Token counts are taken once, when a message is appended.
pub struct ContextManager {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    model: String,
    token_counter: Arc<TokenCounter>,
}

impl ContextManager {
    pub fn new(model: impl Into<String>, token_counter: Arc<TokenCounter>) -> Self {
        Self {
            system_prompt: None,
            messages: Vec::new(),
            model: model.into(),
            token_counter,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.system_prompt = (!system_prompt.is_empty()).then_some(system_prompt);
        self
    }

    fn count(&self, text: &str) -> usize {
        self.token_counter.count_tokens(text, Some(&self.model))
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) -> &Message {
        let content = content.into();
        let tokens = self.count(&content);
        self.push(Message::user(content).with_token_count(tokens))
    }

    pub fn add_assistant_message(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> &Message {
        let content = content.into();
        let tokens = self.count(&content);
        self.push(
            Message::assistant(content)
                .with_tool_calls(tool_calls)
                .with_token_count(tokens),
        )
    }

    pub fn add_tool_result(
        &mut self,
        call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> &Message {
        let content = content.into();
        let tokens = self.count(&content);
        self.push(
            Message::tool(call_id, content)
                .with_error(is_error)
                .with_token_count(tokens),
        )
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// The messages to transmit, led by the system prompt when one is set.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(Message::system(system_prompt.clone()));
        }
        messages.extend(self.messages.iter().cloned());
        messages
    }

    /// Messages appended so far, without the system prompt.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }
}
