//! Chat-completion client for the assistant.
//!
//! Speaks the OpenAI-compatible `/chat/completions` API and Ollama's native
//! `/api/chat`, both with tool calling.

mod client;
mod error;
mod ollama;
mod openai;
mod thinking;
mod types;

pub use client::{ChatModel, LlmClient, LlmClientConfig, Provider};
pub use error::{LlmError, Result};
pub use thinking::split_thinking;
pub use types::{
    ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage, validate_tool_name,
};
