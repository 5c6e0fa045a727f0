//! The bounded tool-calling loop between the user's conversation and the LLM.
//!
//! Reads run immediately and refresh the read snapshot. Proposals are checked
//! against that snapshot, then queued for the user; the loop stops as soon as
//! anything is queued.

use crate::catalog::{self, ParsedCall, ReadRequest, ToolName};
use crate::freshness::{Clock, EntityKind};
use crate::proposal::PendingProposalEntry;
use crate::queue::ActivePrompt;
use crate::session::UserState;
use agenda_llm::{ChatMessage, ChatModel, Role, ToolCall, ToolDefinition};
use agenda_tools::{ReadBackend, ToolError};
use anyhow::Result;
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ITERATION_LIMIT_REPLY: &str = "I'm having trouble processing that. Can you try again?";
pub const LLM_FAILURE_REPLY: &str = "Sorry, I had trouble processing that. Can you try again?";
pub const EMPTY_REPLY: &str = "I'm not sure how to help with that.";

const REASONING_TARGET: &str = "agent_reasoning";
const LOGGED_RESULT_CHARS: usize = 500;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal assistant. Help manage the user's calendar and tasks.

Current date and time: {current_datetime}

## Guidelines

**Clarify before proposing:**
- If details are ambiguous or missing (time, duration, specific date), ASK the user first
- Don't assume times - ask \"What time?\" if not specified
- Don't guess durations - ask if it matters
- Example: \"Schedule a meeting tomorrow\" → Ask \"What time would you like it?\"

**Read before write:**
- ALWAYS call get_tasks or get_calendar_events BEFORE editing/deleting
- This ensures you have the correct, current IDs
- Never use IDs from memory - always fetch fresh

**Proposals:**
- Use propose_* tools for any create/edit/delete/complete operation
- Include all relevant details the user provided
- User will confirm before execution

**After actions complete:**
- Acknowledge what was done naturally
- Offer to help with related tasks if appropriate

Be conversational and helpful.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    FinalText(String),
    /// Proposals were queued; the prompt presents the active one.
    AwaitingConfirmation(ActivePrompt),
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub llm_timeout: Duration,
    pub freshness_ttl: TimeDelta,
    /// Zone used to render `{current_datetime}`.
    pub timezone: Tz,
    /// Replaces the built-in prompt. `{current_datetime}` is substituted.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            llm_timeout: Duration::from_secs(120),
            freshness_ttl: TimeDelta::seconds(120),
            timezone: Tz::UTC,
            system_prompt: None,
        }
    }
}

pub struct AgentLoop {
    llm: Arc<dyn ChatModel>,
    reads: Arc<dyn ReadBackend>,
    clock: Arc<dyn Clock>,
    tools: Vec<ToolDefinition>,
    settings: AgentSettings,
}

enum CallResult {
    Answered(String),
    Queued(PendingProposalEntry),
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        reads: Arc<dyn ReadBackend>,
        clock: Arc<dyn Clock>,
        settings: AgentSettings,
    ) -> Result<Self> {
        let tools = catalog::tool_definitions()?;
        if settings.max_iterations == 0 {
            return Err(anyhow::anyhow!("agent.max_iterations must be at least 1"));
        }
        Ok(Self {
            llm,
            reads,
            clock,
            tools,
            settings,
        })
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Appends the user's message and runs the loop.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %state.id))]
    pub async fn run_turn(&self, state: &mut UserState, user_message: &str) -> TurnOutcome {
        tracing::info!(
            target: REASONING_TARGET,
            message_len = user_message.len(),
            new_conversation = state.conversation.is_empty(),
            prior_history_messages = state.conversation.len(),
            "user message received"
        );
        state.conversation.push(ChatMessage::user(user_message));
        self.iterate(state).await
    }

    /// Runs the loop on the existing conversation, e.g. after the last
    /// queued proposal was resolved.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %state.id))]
    pub async fn resume(&self, state: &mut UserState) -> TurnOutcome {
        self.iterate(state).await
    }

    async fn iterate(&self, state: &mut UserState) -> TurnOutcome {
        for iteration in 1..=self.settings.max_iterations {
            let messages = self.build_prompt(state.conversation.messages());
            tracing::debug!(
                target: REASONING_TARGET,
                iteration,
                prompt_messages = messages.len(),
                "llm request"
            );

            let started = Instant::now();
            let response =
                match tokio::time::timeout(self.settings.llm_timeout, self.llm.chat(&messages, &self.tools))
                    .await
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => {
                        tracing::warn!(iteration, error = %e, "llm call failed");
                        return TurnOutcome::FinalText(LLM_FAILURE_REPLY.to_string());
                    }
                    Err(_) => {
                        tracing::warn!(
                            iteration,
                            timeout_secs = self.settings.llm_timeout.as_secs(),
                            "llm call timed out"
                        );
                        return TurnOutcome::FinalText(LLM_FAILURE_REPLY.to_string());
                    }
                };
            tracing::info!(
                target: REASONING_TARGET,
                iteration,
                latency_ms = started.elapsed().as_millis() as u64,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                tool_calls = response.message.tool_calls.len(),
                content_len = response.message.content.len(),
                "llm response"
            );
            if let Some(thinking) = response.thinking.as_deref().filter(|t| !t.is_empty()) {
                tracing::debug!(target: REASONING_TARGET, iteration, %thinking, "model reasoning");
            }

            let message = ChatMessage {
                role: Role::Assistant,
                ..response.message
            };
            let tool_calls = message.tool_calls.clone();
            state.conversation.push(message.clone());

            if tool_calls.is_empty() {
                let text = if message.content.trim().is_empty() {
                    EMPTY_REPLY.to_string()
                } else {
                    message.content
                };
                tracing::info!(
                    target: REASONING_TARGET,
                    iteration,
                    response_len = text.len(),
                    "final response"
                );
                return TurnOutcome::FinalText(text);
            }

            let mut batch = Vec::new();
            for call in &tool_calls {
                match self.handle_tool_call(state, call).await {
                    CallResult::Answered(content) => {
                        state
                            .conversation
                            .push(ChatMessage::tool_result(&call.id, content));
                    }
                    CallResult::Queued(entry) => batch.push(entry),
                }
            }

            if !batch.is_empty() {
                tracing::info!(
                    target: REASONING_TARGET,
                    iteration,
                    queued = batch.len(),
                    "proposals awaiting confirmation"
                );
                state.queue.enqueue_all(batch);
                return TurnOutcome::AwaitingConfirmation(
                    state.queue.active_prompt().unwrap_or_default(),
                );
            }
        }

        tracing::error!(
            max_iterations = self.settings.max_iterations,
            "agent iteration limit reached"
        );
        TurnOutcome::FinalText(ITERATION_LIMIT_REPLY.to_string())
    }

    async fn handle_tool_call(&self, state: &mut UserState, call: &ToolCall) -> CallResult {
        tracing::info!(
            target: REASONING_TARGET,
            tool_call_id = %call.id,
            tool_name = %call.name,
            arguments = %call.arguments,
            "tool call"
        );
        let Some(tool) = ToolName::from_name(&call.name) else {
            tracing::warn!(tool_name = %call.name, "tool call referenced unknown tool");
            return CallResult::Answered(error_content(&format!("unknown tool: {}", call.name)));
        };
        let parsed = match catalog::parse_arguments(&call.arguments)
            .and_then(|args| catalog::parse_call(tool, &args))
        {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(tool_name = %call.name, error = %e, "tool arguments rejected");
                return CallResult::Answered(error_content(&e.to_string()));
            }
        };
        tracing::debug!(tool_name = %call.name, class = ?tool.class(), "tool call classified");

        match parsed {
            ParsedCall::Read(request) => {
                let started = Instant::now();
                let content = match self.execute_read(state, request).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(tool_name = %call.name, error = %e, "read tool failed");
                        error_content(&e.to_string())
                    }
                };
                tracing::info!(
                    target: REASONING_TARGET,
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    latency_ms = started.elapsed().as_millis() as u64,
                    result = %truncate_chars(&content, LOGGED_RESULT_CHARS),
                    "tool result"
                );
                CallResult::Answered(content)
            }
            ParsedCall::Propose(proposal) => {
                if let Some((kind, id)) = proposal.target() {
                    let now = self.clock.now();
                    if let Err(e) =
                        state
                            .freshness
                            .validate(kind, id, now, self.settings.freshness_ttl)
                    {
                        tracing::info!(
                            target: REASONING_TARGET,
                            tool_call_id = %call.id,
                            tool_name = %call.name,
                            error = %e,
                            "proposal rejected"
                        );
                        return CallResult::Answered(error_content(&e.to_string()));
                    }
                }
                CallResult::Queued(PendingProposalEntry::new(call.id.clone(), tool, proposal))
            }
        }
    }

    /// Runs a read and, on success only, replaces the snapshot for its kind.
    async fn execute_read(
        &self,
        state: &mut UserState,
        request: ReadRequest,
    ) -> std::result::Result<String, ToolError> {
        let (kind, ids, content) = match request {
            ReadRequest::CalendarEvents { days_ahead } => {
                let events = self.reads.get_calendar_events(days_ahead).await?;
                let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
                (EntityKind::Calendar, ids, serde_json::to_string(&events)?)
            }
            ReadRequest::TodayEvents => {
                let events = self.reads.get_today_events().await?;
                let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
                (EntityKind::Calendar, ids, serde_json::to_string(&events)?)
            }
            ReadRequest::Tasks => {
                let tasks = self.reads.get_tasks().await?;
                let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
                (EntityKind::Tasks, ids, serde_json::to_string(&tasks)?)
            }
        };
        state.freshness.record_read(kind, ids, self.clock.now());
        Ok(content)
    }

    fn system_prompt(&self) -> String {
        let now = self.clock.now().with_timezone(&self.settings.timezone);
        self.settings
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .replace(
                "{current_datetime}",
                &now.format("%Y-%m-%d %H:%M").to_string(),
            )
    }

    /// Fresh system prompt plus history. Tool calls that never received a
    /// result (siblings dropped by a change request) are removed from the
    /// copy sent to the model; providers reject unanswered calls.
    fn build_prompt(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let answered: HashSet<&str> = history
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        let mut out = Vec::with_capacity(history.len() + 1);
        out.push(ChatMessage::system(self.system_prompt()));
        for msg in history {
            if msg.role != Role::Assistant
                || msg.tool_calls.iter().all(|c| answered.contains(c.id.as_str()))
            {
                out.push(msg.clone());
                continue;
            }
            let mut normalized = msg.clone();
            normalized
                .tool_calls
                .retain(|c| answered.contains(c.id.as_str()));
            tracing::debug!(
                dropped = msg.tool_calls.len() - normalized.tool_calls.len(),
                "unanswered tool calls removed from prompt"
            );
            if normalized.tool_calls.is_empty() && normalized.content.trim().is_empty() {
                continue;
            }
            out.push(normalized);
        }
        out
    }
}

pub(crate) fn error_content(message: &str) -> String {
    json!({ "error": message }).to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
