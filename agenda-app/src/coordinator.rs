//! Entry points the chat transports drive: free text, and the user's answer
//! to the proposal on screen.

use crate::assistant::{AgentLoop, TurnOutcome};
use crate::dispatcher::Dispatcher;
use crate::proposal::PendingProposalEntry;
use crate::queue::ActivePrompt;
use crate::session::{SessionManager, UserKey, UserState};
use agenda_llm::ChatMessage;
use serde_json::json;

const NOTHING_TO_CONFIRM: &str = "No pending action to confirm.";
const NOTHING_TO_CHANGE: &str = "No pending action to change.";
const NO_LONGER_PENDING: &str = "This proposal is no longer pending.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    NothingPending,
    /// The answer named a proposal that is not the active one.
    Superseded,
    /// More proposals remain; `prompt` presents the next one.
    Next { ack: String, prompt: ActivePrompt },
    /// The queue drained and the agent took its turn.
    Finished { ack: String, follow_up: TurnOutcome },
}

impl ConfirmationOutcome {
    /// Text replacing the prompt the user answered.
    pub fn ack(&self) -> &str {
        match self {
            Self::NothingPending => NOTHING_TO_CONFIRM,
            Self::Superseded => NO_LONGER_PENDING,
            Self::Next { ack, .. } | Self::Finished { ack, .. } => ack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    Cancelled { count: usize },
    Superseded,
}

impl CancellationOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Cancelled { count } if *count > 1 => {
                format!("Cancelled {count} pending actions.")
            }
            Self::Cancelled { .. } => "Cancelled.".to_string(),
            Self::Superseded => NO_LONGER_PENDING.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    NothingPending,
    Superseded,
    ChangeRequested { proposal: String },
}

impl ChangeOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::NothingPending => NOTHING_TO_CHANGE.to_string(),
            Self::Superseded => NO_LONGER_PENDING.to_string(),
            Self::ChangeRequested { proposal } => format!(
                "Current proposal:\n{proposal}\n\nWhat would you like to change? (Just type your response)"
            ),
        }
    }
}

/// Snapshot for `/status` and `/pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    pub pending: usize,
    pub prompt: Option<ActivePrompt>,
    pub history_messages: usize,
}

pub struct Coordinator {
    sessions: SessionManager,
    agent: AgentLoop,
    dispatcher: Dispatcher,
}

impl Coordinator {
    pub fn new(sessions: SessionManager, agent: AgentLoop, dispatcher: Dispatcher) -> Self {
        Self {
            sessions,
            agent,
            dispatcher,
        }
    }

    pub fn model(&self) -> &str {
        self.agent.model()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Free text always starts a new turn. Proposals still waiting are
    /// cancelled first so each of their calls gets an answer.
    #[tracing::instrument(level = "info", skip_all, fields(user = %user))]
    pub async fn handle_user_text(&self, user: &UserKey, text: &str) -> TurnOutcome {
        let handle = self.sessions.get_or_create(user);
        let mut state = handle.lock().await;
        state.touch();
        let superseded = cancel_pending(&mut state);
        if superseded > 0 {
            tracing::info!(superseded, "pending proposals dropped by new message");
        }
        self.agent.run_turn(&mut state, text).await
    }

    /// `proposal_id` comes from the button the user tapped; `None` answers
    /// whatever is active (the terminal REPL).
    #[tracing::instrument(level = "info", skip_all, fields(user = %user))]
    pub async fn handle_confirm(
        &self,
        user: &UserKey,
        proposal_id: Option<&str>,
    ) -> ConfirmationOutcome {
        let handle = self.sessions.get_or_create(user);
        let mut state = handle.lock().await;
        state.touch();
        if is_superseded(&state, proposal_id) {
            return ConfirmationOutcome::Superseded;
        }
        let Ok(entry) = state.queue.confirm_active() else {
            tracing::info!("confirm with nothing pending");
            return ConfirmationOutcome::NothingPending;
        };

        let outcome = self.dispatcher.dispatch(&entry.proposal).await;
        let content = serde_json::to_string(&outcome)
            .unwrap_or_else(|e| crate::assistant::error_content(&e.to_string()));
        state
            .conversation
            .push(ChatMessage::tool_result(&entry.tool_call_id, content));
        tracing::info!(
            proposal_id = %entry.proposal_id,
            tool_call_id = %entry.tool_call_id,
            tool = entry.tool.as_str(),
            success = outcome.success,
            remaining = state.queue.len(),
            "proposal confirmed"
        );

        let failure = (!outcome.success)
            .then(|| format!("Error: {}", outcome.error.as_deref().unwrap_or("unknown error")));
        if let Some(prompt) = state.queue.active_prompt() {
            return ConfirmationOutcome::Next {
                ack: failure.unwrap_or_else(|| "Done!".to_string()),
                prompt,
            };
        }
        let follow_up = self.agent.resume(&mut state).await;
        ConfirmationOutcome::Finished {
            ack: failure.unwrap_or_else(|| "Confirmed".to_string()),
            follow_up,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(user = %user))]
    pub async fn handle_cancel(
        &self,
        user: &UserKey,
        proposal_id: Option<&str>,
    ) -> CancellationOutcome {
        let handle = self.sessions.get_or_create(user);
        let mut state = handle.lock().await;
        state.touch();
        if is_superseded(&state, proposal_id) {
            return CancellationOutcome::Superseded;
        }
        let count = cancel_pending(&mut state);
        tracing::info!(cancelled = count, "pending proposals cancelled");
        CancellationOutcome::Cancelled { count }
    }

    /// Drops the whole queue but answers only the active proposal's call,
    /// handing its details back to the agent.
    #[tracing::instrument(level = "info", skip_all, fields(user = %user))]
    pub async fn handle_change_request(
        &self,
        user: &UserKey,
        proposal_id: Option<&str>,
    ) -> ChangeOutcome {
        let handle = self.sessions.get_or_create(user);
        let mut state = handle.lock().await;
        state.touch();
        if is_superseded(&state, proposal_id) {
            return ChangeOutcome::Superseded;
        }
        let dropped = state.queue.len().saturating_sub(1);
        let Some(entry) = state.queue.take_for_change() else {
            return ChangeOutcome::NothingPending;
        };
        let content = json!({
            "status": "change_requested",
            "message": "User wants to modify this proposal. Ask what they'd like to change.",
            "original_proposal": entry.proposal.to_json(),
        });
        state
            .conversation
            .push(ChatMessage::tool_result(&entry.tool_call_id, content.to_string()));
        tracing::info!(
            tool_call_id = %entry.tool_call_id,
            dropped,
            "change requested"
        );
        ChangeOutcome::ChangeRequested {
            proposal: entry.proposal.render(),
        }
    }

    /// Clears conversation, read snapshot and queue. Idempotent.
    #[tracing::instrument(level = "info", skip_all, fields(user = %user))]
    pub async fn reset_session(&self, user: &UserKey) {
        let handle = self.sessions.get_or_create(user);
        handle.lock().await.reset();
        tracing::info!("session reset");
    }

    pub async fn pending_summary(&self, user: &UserKey) -> PendingSummary {
        let handle = self.sessions.get_or_create(user);
        let state = handle.lock().await;
        PendingSummary {
            pending: state.queue.len(),
            prompt: state.queue.active_prompt(),
            history_messages: state.conversation.len(),
        }
    }
}

fn is_superseded(state: &UserState, proposal_id: Option<&str>) -> bool {
    let Some(id) = proposal_id else {
        return false;
    };
    let stale = !state.queue.is_active(id);
    if stale {
        tracing::info!(proposal_id = id, "answer for a prompt that is no longer active");
    }
    stale
}

/// Drains the queue, answering every drained call as cancelled.
fn cancel_pending(state: &mut UserState) -> usize {
    if state.queue.is_empty() {
        return 0;
    }
    let drained: Vec<PendingProposalEntry> = state.queue.cancel_all();
    let content = json!({"status": "cancelled", "message": "User cancelled the action"}).to_string();
    for entry in &drained {
        state
            .conversation
            .push(ChatMessage::tool_result(&entry.tool_call_id, content.clone()));
    }
    drained.len()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::assistant::AgentSettings;
    use crate::freshness::test_support::ManualClock;
    use agenda_llm::ChatModel;
    use agenda_tools::InMemoryPlanner;
    use std::sync::Arc;

    pub(crate) fn coordinator(
        model: impl ChatModel + 'static,
        planner: Arc<InMemoryPlanner>,
    ) -> Coordinator {
        let agent = AgentLoop::new(
            Arc::new(model),
            planner.clone(),
            Arc::new(ManualClock::new()),
            AgentSettings::default(),
        )
        .expect("agent builds");
        Coordinator::new(SessionManager::new(20), agent, Dispatcher::new(planner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AgentSettings;
    use crate::assistant::test_support::ScriptedModel;
    use crate::freshness::test_support::ManualClock;
    use agenda_llm::Role;
    use agenda_tools::{InMemoryPlanner, RecordedMutation, Task};
    use serde_json::Value;
    use std::sync::Arc;

    struct Harness {
        coordinator: Coordinator,
        model: Arc<ScriptedModel>,
        planner: Arc<InMemoryPlanner>,
        clock: Arc<ManualClock>,
        user: UserKey,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let model = Arc::new(model);
        let planner = Arc::new(InMemoryPlanner::new().with_tasks(vec![Task {
            id: "t1".to_string(),
            tasklist_id: "L1".to_string(),
            title: "Pay rent".to_string(),
            notes: String::new(),
            due: String::new(),
            list: "My Tasks".to_string(),
        }]));
        let clock = Arc::new(ManualClock::new());
        let agent = AgentLoop::new(
            model.clone(),
            planner.clone(),
            clock.clone(),
            AgentSettings::default(),
        )
        .expect("agent builds");
        let coordinator = Coordinator::new(
            SessionManager::new(20),
            agent,
            Dispatcher::new(planner.clone()),
        );
        Harness {
            coordinator,
            model,
            planner,
            clock,
            user: UserKey::new("test", "u1"),
        }
    }

    async fn tool_results(h: &Harness) -> Vec<(String, Value)> {
        let handle = h.coordinator.sessions.get_or_create(&h.user);
        let state = handle.lock().await;
        state
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| {
                (
                    m.tool_call_id.clone().unwrap_or_default(),
                    serde_json::from_str(&m.content).expect("tool result is json"),
                )
            })
            .collect()
    }

    fn three_creates() -> ScriptedModel {
        ScriptedModel::new().reply_tools(&[
            ("p1", "propose_create_task", json!({"title": "A"})),
            ("p2", "propose_create_task", json!({"title": "B"})),
            ("p3", "propose_create_task", json!({"title": "C"})),
        ])
    }

    #[tokio::test]
    async fn confirming_each_of_three_drains_queue_in_order() {
        let h = harness(three_creates().reply_text("All three are on your list."));
        let turn = h.coordinator.handle_user_text(&h.user, "add A, B, C").await;
        assert!(matches!(turn, TurnOutcome::AwaitingConfirmation(ref prompt) if prompt.text.starts_with("[1/3] ")));

        let first = h.coordinator.handle_confirm(&h.user, None).await;
        let ConfirmationOutcome::Next { ack, prompt } = first else {
            panic!("expected next prompt, got {first:?}");
        };
        assert_eq!(ack, "Done!");
        assert!(prompt.text.starts_with("[1/2] Proposed action:\n\n**Create Task**\n  Title: B"));

        let second = h.coordinator.handle_confirm(&h.user, None).await;
        let ConfirmationOutcome::Next { prompt, .. } = second else {
            panic!("expected next prompt");
        };
        assert!(prompt.text.starts_with("Proposed action:\n\n**Create Task**\n  Title: C"));

        let third = h.coordinator.handle_confirm(&h.user, None).await;
        assert_eq!(
            third,
            ConfirmationOutcome::Finished {
                ack: "Confirmed".to_string(),
                follow_up: TurnOutcome::FinalText("All three are on your list.".to_string()),
            }
        );
        let titles: Vec<String> = h
            .planner
            .mutations()
            .into_iter()
            .filter_map(|m| match m {
                RecordedMutation::CreateTask(t) => Some(t.title),
                _ => None,
            })
            .collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(
            h.coordinator.handle_confirm(&h.user, None).await,
            ConfirmationOutcome::NothingPending
        );
        let ids: Vec<String> = tool_results(&h).await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn cancel_answers_every_pending_call_without_llm() {
        let h = harness(three_creates());
        h.coordinator.handle_user_text(&h.user, "add A, B, C").await;
        let calls_before = h.model.calls();

        let outcome = h.coordinator.handle_cancel(&h.user, None).await;
        assert_eq!(outcome, CancellationOutcome::Cancelled { count: 3 });
        assert_eq!(outcome.message(), "Cancelled 3 pending actions.");
        assert_eq!(h.model.calls(), calls_before);
        assert!(h.planner.mutations().is_empty());

        let results = tool_results(&h).await;
        assert_eq!(results.len(), 3);
        for ((id, body), expected) in results.iter().zip(["p1", "p2", "p3"]) {
            assert_eq!(id, expected);
            assert_eq!(body["status"], json!("cancelled"));
            assert_eq!(body["message"], json!("User cancelled the action"));
        }
        assert_eq!(h.coordinator.pending_summary(&h.user).await.pending, 0);
    }

    #[tokio::test]
    async fn single_cancel_says_cancelled() {
        let h = harness(ScriptedModel::new());
        assert_eq!(h.coordinator.handle_cancel(&h.user, None).await.message(), "Cancelled.");
    }

    #[tokio::test]
    async fn change_drains_all_but_answers_only_active() {
        let h = harness(three_creates());
        h.coordinator.handle_user_text(&h.user, "add A, B, C").await;
        let calls_before = h.model.calls();

        let outcome = h.coordinator.handle_change_request(&h.user, None).await;
        assert_eq!(
            outcome.message(),
            "Current proposal:\n**Create Task**\n  Title: A\n\nWhat would you like to change? (Just type your response)"
        );
        assert_eq!(h.model.calls(), calls_before);

        let results = tool_results(&h).await;
        assert_eq!(results.len(), 1);
        let (id, body) = &results[0];
        assert_eq!(id, "p1");
        assert_eq!(body["status"], json!("change_requested"));
        assert_eq!(body["original_proposal"]["title"], json!("A"));
        assert_eq!(h.coordinator.pending_summary(&h.user).await.pending, 0);
        assert_eq!(
            h.coordinator.handle_change_request(&h.user, None).await,
            ChangeOutcome::NothingPending
        );
    }

    #[tokio::test]
    async fn answers_for_an_earlier_prompt_touch_nothing() {
        let h = harness(
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "Buy milk"}))])
                .reply_tools(&[("p2", "propose_create_task", json!({"title": "Buy bread"}))]),
        );
        let TurnOutcome::AwaitingConfirmation(first) =
            h.coordinator.handle_user_text(&h.user, "buy milk").await
        else {
            panic!("expected confirmation");
        };
        let TurnOutcome::AwaitingConfirmation(second) =
            h.coordinator.handle_user_text(&h.user, "bread instead").await
        else {
            panic!("expected confirmation");
        };
        assert_ne!(first.proposal_id, second.proposal_id);
        let stale = Some(first.proposal_id.as_str());

        let confirm = h.coordinator.handle_confirm(&h.user, stale).await;
        assert_eq!(confirm, ConfirmationOutcome::Superseded);
        assert_eq!(confirm.ack(), "This proposal is no longer pending.");
        assert_eq!(
            h.coordinator.handle_cancel(&h.user, stale).await,
            CancellationOutcome::Superseded
        );
        assert_eq!(
            h.coordinator.handle_change_request(&h.user, stale).await,
            ChangeOutcome::Superseded
        );
        assert!(h.planner.mutations().is_empty());
        assert_eq!(h.coordinator.pending_summary(&h.user).await.pending, 1);

        let current = h
            .coordinator
            .handle_confirm(&h.user, Some(second.proposal_id.as_str()))
            .await;
        assert!(matches!(current, ConfirmationOutcome::Finished { .. }), "{current:?}");
        assert!(matches!(
            h.planner.mutations().as_slice(),
            [RecordedMutation::CreateTask(t)] if t.title == "Buy bread"
        ));
        assert_eq!(
            h.coordinator
                .handle_confirm(&h.user, Some(second.proposal_id.as_str()))
                .await,
            ConfirmationOutcome::Superseded
        );
    }

    #[tokio::test]
    async fn failed_write_is_reported_and_fed_back() {
        let h = harness(
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "A"}))])
                .reply_text("That didn't work, sorry."),
        );
        h.planner.fail_next_mutation("quota exceeded");
        h.coordinator.handle_user_text(&h.user, "add A").await;
        let outcome = h.coordinator.handle_confirm(&h.user, None).await;
        assert_eq!(outcome.ack(), "Error: execution failed: quota exceeded");
        let results = tool_results(&h).await;
        assert_eq!(results[0].1["success"], json!(false));
        assert_eq!(results[0].1["error"], json!("execution failed: quota exceeded"));
    }

    #[tokio::test]
    async fn confirm_passes_execution_fields_only() {
        let h = harness(
            ScriptedModel::new()
                .reply_tools(&[("r1", "get_tasks", json!({}))])
                .reply_tools(&[(
                    "p1",
                    "propose_complete_task",
                    json!({"task_id": "t1", "task_title": "Rent (display)", "tasklist_id": "L1"}),
                )])
                .reply_text("Marked done."),
        );
        h.coordinator.handle_user_text(&h.user, "rent is paid").await;
        h.clock.advance_secs(30);
        h.coordinator.handle_confirm(&h.user, None).await;
        assert_eq!(
            h.planner.mutations(),
            vec![RecordedMutation::CompleteTask {
                task_id: "t1".to_string(),
                tasklist_id: Some("L1".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn new_text_while_pending_cancels_queue_first() {
        let h = harness(
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "A"}))])
                .reply_text("Sure, what else?"),
        );
        h.coordinator.handle_user_text(&h.user, "add A").await;
        let outcome = h.coordinator.handle_user_text(&h.user, "never mind").await;
        assert_eq!(outcome, TurnOutcome::FinalText("Sure, what else?".to_string()));
        let results = tool_results(&h).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1["status"], json!("cancelled"));
        assert!(h.planner.mutations().is_empty());
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_clears_everything() {
        let h = harness(three_creates());
        h.coordinator.handle_user_text(&h.user, "add A, B, C").await;
        h.coordinator.reset_session(&h.user).await;
        h.coordinator.reset_session(&h.user).await;
        let summary = h.coordinator.pending_summary(&h.user).await;
        assert_eq!(
            summary,
            PendingSummary {
                pending: 0,
                prompt: None,
                history_messages: 0,
            }
        );
    }
}
