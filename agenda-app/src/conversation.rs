//! Per-user message history, bounded to the most recent messages.
//!
//! Trimming only ever cuts in front of a user message, so a tool result is
//! never separated from the assistant message that requested it. A single
//! turn longer than the bound is kept whole.

use agenda_llm::{ChatMessage, Role};

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.trim();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn trim(&mut self) {
        let before = self.messages.len();
        while self.messages.len() > self.max_messages {
            let next_turn = self
                .messages
                .iter()
                .skip(1)
                .position(|m| m.role == Role::User)
                .map(|i| i + 1);
            let Some(cut) = next_turn else {
                break;
            };
            self.messages.drain(..cut);
        }
        if self.messages.len() != before {
            tracing::debug!(
                dropped = before - self.messages.len(),
                kept = self.messages.len(),
                max_messages = self.max_messages,
                "conversation trimmed"
            );
        }
    }
}
