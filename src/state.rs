use std::collections::HashMap;

use serde_json::Value;

use crate::message::Message;

/// Append-only message log plus a side-context map threaded through the loop
/// unchanged. One instance is created per request, owned exclusively by the
/// orchestrator run, and dropped with it.
///
/// The context map is written only at the embedding boundary: callers seed it
/// before a run and fold tool payloads into it between runs. Tools themselves
/// return payloads and never mutate state, since a turn's calls execute
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    context: HashMap<String, Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            context: HashMap::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }
}
