//! Inbound multiplexer: every channel adapter feeds one queue, and each
//! message is routed to a command, the agent, or the confirmation flow.
//! Each user gets a lane of their own, so a slow turn only delays that user.

use crate::assistant::TurnOutcome;
use crate::commands;
use crate::config::AgendaConfig;
use crate::coordinator::{ConfirmationOutcome, Coordinator};
use crate::session::UserKey;
use agenda_channels::{
    ActionButton, ChannelAdapter, InboundMessage, InboundMessageKind, MessageId, OutboundMessage,
};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const ACTION_CONFIRM: &str = "confirm";
pub const ACTION_CANCEL: &str = "cancel";
pub const ACTION_CHANGE: &str = "change";

/// How long in-flight turns may run after shutdown before they are aborted.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Buttons for one prompt. Each carries `<action>:<proposal_id>` so a tap
/// can only ever answer the proposal it was shown with.
pub fn confirmation_buttons(proposal_id: &str) -> Vec<Vec<ActionButton>> {
    let data = |action: &str| format!("{action}:{proposal_id}");
    vec![
        vec![
            ActionButton::new("Confirm", data(ACTION_CONFIRM)),
            ActionButton::new("Cancel", data(ACTION_CANCEL)),
        ],
        vec![ActionButton::new("Change", data(ACTION_CHANGE))],
    ]
}

/// Splits button data into the action and the proposal it targets.
fn parse_action(data: &str) -> (&str, Option<&str>) {
    match data.split_once(':') {
        Some((action, id)) if !id.is_empty() => (action, Some(id)),
        Some((action, _)) => (action, None),
        None => (data, None),
    }
}

type Lane = mpsc::UnboundedSender<InboundMessage>;

pub struct Gateway {
    cfg: AgendaConfig,
    started_at: Instant,
    coordinator: Arc<Coordinator>,
    channels: HashMap<String, Arc<dyn ChannelAdapter>>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl Gateway {
    pub fn new(
        cfg: AgendaConfig,
        started_at: Instant,
        coordinator: Arc<Coordinator>,
        channels: HashMap<String, Arc<dyn ChannelAdapter>>,
        inbound_rx: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        Self {
            cfg,
            started_at,
            coordinator,
            channels,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    /// Runs until every sender is dropped or `shutdown` fires, then gives
    /// in-flight turns [`SHUTDOWN_DRAIN`] to finish.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self.inbound_rx.lock().await;
        let mut lanes: HashMap<UserKey, Lane> = HashMap::new();
        let mut workers: JoinSet<()> = JoinSet::new();
        loop {
            let inbound = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("gateway shutting down");
                    break;
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(%e, "user lane ended abnormally");
                    }
                    continue;
                }
                msg = rx.recv() => msg,
            };
            let Some(inbound) = inbound else {
                break;
            };
            if !self.is_admitted(&inbound) {
                continue;
            }

            let user = UserKey::new(inbound.channel_id.clone(), inbound.sender_id.clone());
            let inbound = match lanes.get(&user) {
                Some(lane) => match lane.send(inbound) {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(returned)) => returned,
                },
                None => inbound,
            };
            let (lane_tx, lane_rx) = mpsc::unbounded_channel();
            workers.spawn(self.clone().run_lane(inbound, lane_rx));
            tracing::debug!(%user, lanes = lanes.len() + 1, "user lane opened");
            lanes.insert(user, lane_tx);
        }

        drop(lanes);
        let drain = async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(%e, "user lane ended abnormally");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            tracing::warn!(
                remaining = workers.len(),
                "in-flight turns did not finish; aborting"
            );
            workers.abort_all();
        }
        Ok(())
    }

    /// Handles one user's messages strictly in arrival order.
    async fn run_lane(
        self: Arc<Self>,
        first: InboundMessage,
        mut lane: mpsc::UnboundedReceiver<InboundMessage>,
    ) {
        let mut next = Some(first);
        while let Some(inbound) = next {
            if let Err(e) = self.handle_inbound(inbound).await {
                tracing::warn!(%e, "handle_inbound failed");
            }
            next = lane.recv().await;
        }
    }

    fn is_admitted(&self, inbound: &InboundMessage) -> bool {
        let allowed = self.cfg.is_sender_allowed(inbound.sender_id.as_str());
        if !allowed {
            tracing::warn!(
                channel = %inbound.channel_id,
                sender_id = %inbound.sender_id,
                "sender not in security.allowed_users; ignoring"
            );
        }
        allowed
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(channel = %inbound.channel_id, sender = %inbound.sender_id, kind = ?inbound.kind)
    )]
    pub async fn handle_inbound(&self, inbound: InboundMessage) -> Result<()> {
        if !self.is_admitted(&inbound) {
            return Ok(());
        }

        let channel = self
            .channels
            .get(inbound.channel_id.as_str())
            .ok_or_else(|| anyhow::anyhow!("unknown channel: {}", inbound.channel_id))?
            .clone();
        let user = UserKey::new(inbound.channel_id.clone(), inbound.sender_id.clone());

        match inbound.kind {
            InboundMessageKind::Message => self.handle_text(channel.as_ref(), &user, &inbound).await,
            InboundMessageKind::Action => {
                self.handle_action(channel.as_ref(), &user, &inbound).await
            }
        }
    }

    async fn handle_text(
        &self,
        channel: &dyn ChannelAdapter,
        user: &UserKey,
        inbound: &InboundMessage,
    ) -> Result<()> {
        let target = inbound.reply_target();
        if let Some(reply) = commands::handle_command(
            &self.cfg,
            &self.coordinator,
            user,
            &inbound.content,
            self.started_at.elapsed(),
        )
        .await
        {
            let mut message = turn_message(reply);
            message.reply_to_message_id = Some(inbound.message_id.clone());
            return channel.send(target, message).await;
        }

        show_typing(channel, target).await;
        let outcome = self
            .coordinator
            .handle_user_text(user, &inbound.content)
            .await;
        channel.send(target, turn_message(outcome)).await
    }

    async fn handle_action(
        &self,
        channel: &dyn ChannelAdapter,
        user: &UserKey,
        inbound: &InboundMessage,
    ) -> Result<()> {
        if let Some(token) = inbound.action_token.as_deref() {
            if let Err(e) = channel.acknowledge_action(token).await {
                tracing::debug!(%e, "acknowledge_action failed");
            }
        }
        let target = inbound.reply_target();
        let (action, proposal_id) = parse_action(inbound.content.trim());

        match action {
            ACTION_CONFIRM => {
                show_typing(channel, target).await;
                let outcome = self.coordinator.handle_confirm(user, proposal_id).await;
                replace_prompt(channel, target, &inbound.message_id, outcome.ack()).await?;
                let follow_up = match outcome {
                    ConfirmationOutcome::NothingPending | ConfirmationOutcome::Superseded => {
                        return Ok(());
                    }
                    ConfirmationOutcome::Next { prompt, .. } => {
                        TurnOutcome::AwaitingConfirmation(prompt)
                    }
                    ConfirmationOutcome::Finished { follow_up, .. } => follow_up,
                };
                channel.send(target, turn_message(follow_up)).await
            }
            ACTION_CANCEL => {
                let outcome = self.coordinator.handle_cancel(user, proposal_id).await;
                replace_prompt(channel, target, &inbound.message_id, &outcome.message()).await
            }
            ACTION_CHANGE => {
                let outcome = self
                    .coordinator
                    .handle_change_request(user, proposal_id)
                    .await;
                replace_prompt(channel, target, &inbound.message_id, &outcome.message()).await
            }
            other => {
                tracing::debug!(action = other, "ignoring unknown action");
                Ok(())
            }
        }
    }
}

async fn show_typing(channel: &dyn ChannelAdapter, target: &str) {
    if !channel.supports_typing_events() {
        return;
    }
    if let Err(e) = channel.send_typing(target).await {
        tracing::debug!(%e, "send_typing failed");
    }
}

fn turn_message(outcome: TurnOutcome) -> OutboundMessage {
    match outcome {
        TurnOutcome::FinalText(text) => OutboundMessage::text(text),
        TurnOutcome::AwaitingConfirmation(prompt) => OutboundMessage::text(prompt.text)
            .with_actions(confirmation_buttons(&prompt.proposal_id)),
    }
}

/// Edits the answered prompt in place, which also drops its buttons.
/// Falls back to a new message on channels that cannot edit.
async fn replace_prompt(
    channel: &dyn ChannelAdapter,
    target: &str,
    prompt_id: &MessageId,
    text: &str,
) -> Result<()> {
    match channel
        .edit(target, prompt_id, OutboundMessage::text(text))
        .await
    {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(%e, "edit failed; sending instead");
            channel.send(target, OutboundMessage::text(text)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::test_support::ScriptedModel;
    use crate::coordinator::test_support::coordinator;
    use agenda_channels::{ChannelId, SenderId};
    use agenda_llm::{ChatMessage, ChatModel, ChatResponse, Role, ToolDefinition, Usage};
    use agenda_tools::{InMemoryPlanner, RecordedMutation, Task};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Send {
            to: String,
            content: String,
            buttons: Vec<String>,
        },
        Edit {
            message_id: String,
            content: String,
        },
        Ack(String),
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingChannel {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().expect("sent lock").clone()
        }

        fn replies_to(&self, recipient: &str) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Send { to, content, .. } if to == recipient => Some(content),
                    _ => None,
                })
                .collect()
        }

        /// Button data of the most recent prompt sent with buttons.
        fn last_buttons(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .rev()
                .find_map(|s| match s {
                    Sent::Send { buttons, .. } if !buttons.is_empty() => Some(buttons),
                    _ => None,
                })
                .expect("a prompt with buttons was sent")
        }
    }

    #[async_trait]
    impl ChannelAdapter for RecordingChannel {
        fn channel_id(&self) -> &str {
            "test"
        }

        async fn start(&self, _tx: mpsc::Sender<InboundMessage>) -> Result<()> {
            Ok(())
        }

        async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
            self.sent.lock().expect("sent lock").push(Sent::Send {
                to: recipient_id.to_string(),
                content: message.content,
                buttons: message
                    .actions
                    .iter()
                    .flatten()
                    .map(|b| b.data.clone())
                    .collect(),
            });
            Ok(())
        }

        async fn edit(
            &self,
            _recipient_id: &str,
            message_id: &MessageId,
            message: OutboundMessage,
        ) -> Result<()> {
            self.sent.lock().expect("sent lock").push(Sent::Edit {
                message_id: message_id.to_string(),
                content: message.content,
            });
            Ok(())
        }

        async fn acknowledge_action(&self, action_token: &str) -> Result<()> {
            self.sent
                .lock()
                .expect("sent lock")
                .push(Sent::Ack(action_token.to_string()));
            Ok(())
        }
    }

    /// Answers "slow" only after `gate` is notified; anything else at once.
    struct GatedModel {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ChatModel for GatedModel {
        fn model(&self) -> &str {
            "gated"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> agenda_llm::Result<ChatResponse> {
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let reply = if last_user == "slow" {
                self.gate.notified().await;
                "slow reply"
            } else {
                "quick reply"
            };
            Ok(ChatResponse {
                message: ChatMessage::assistant(reply),
                usage: Usage::default(),
                finish_reason: "stop".to_string(),
                thinking: None,
            })
        }
    }

    fn inbound(kind: InboundMessageKind, sender: &str, content: &str, message_id: &str) -> InboundMessage {
        InboundMessage {
            kind,
            message_id: MessageId::new(message_id),
            channel_id: ChannelId::new("test"),
            sender_id: SenderId::new(sender),
            thread_id: None,
            is_group: false,
            content: content.to_string(),
            action_token: (kind == InboundMessageKind::Action).then(|| format!("cb-{message_id}")),
            metadata: serde_json::Value::Null,
            received_at: chrono::Utc::now(),
        }
    }

    fn gateway(
        security: &str,
        model: impl ChatModel + 'static,
        planner: Arc<InMemoryPlanner>,
    ) -> (Arc<Gateway>, Arc<RecordingChannel>, mpsc::Sender<InboundMessage>) {
        let cfg = AgendaConfig::parse(&format!("[general]\nmodel = \"m\"\n\n[security]\n{security}\n"))
            .expect("config parses");
        let channel = Arc::new(RecordingChannel::default());
        let mut channels: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
        channels.insert("test".to_string(), channel.clone());
        let (tx, rx) = mpsc::channel(8);
        let gw = Gateway::new(
            cfg,
            Instant::now(),
            Arc::new(coordinator(model, planner)),
            channels,
            rx,
        );
        (Arc::new(gw), channel, tx)
    }

    fn rent_planner() -> Arc<InMemoryPlanner> {
        Arc::new(InMemoryPlanner::new().with_tasks(vec![Task {
            id: "t1".to_string(),
            tasklist_id: "L1".to_string(),
            title: "Pay rent".to_string(),
            notes: String::new(),
            due: String::new(),
            list: "My Tasks".to_string(),
        }]))
    }

    async fn wait_for(what: &str, mut ready: impl FnMut() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while !ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {what}");
    }

    #[test]
    fn button_data_names_action_and_proposal() {
        let data: Vec<String> = confirmation_buttons("ab12")
            .into_iter()
            .flatten()
            .map(|b| b.data)
            .collect();
        assert_eq!(data, ["confirm:ab12", "cancel:ab12", "change:ab12"]);
        assert!(data.iter().all(|d| d.len() <= 64));
        assert_eq!(parse_action("confirm:ab12"), ("confirm", Some("ab12")));
        assert_eq!(parse_action("confirm:"), ("confirm", None));
        assert_eq!(parse_action("cancel"), ("cancel", None));
    }

    #[tokio::test]
    async fn sender_outside_allowlist_gets_no_reply() {
        let (gw, channel, _tx) = gateway(
            "allowed_users = [\"42\"]",
            ScriptedModel::new().reply_text("should not run"),
            Arc::new(InMemoryPlanner::new()),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "7", "hi", "1"))
            .await
            .expect("handled");
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn proposal_is_sent_with_buttons_and_confirm_edits_prompt() {
        let planner = Arc::new(InMemoryPlanner::new());
        let (gw, channel, _tx) = gateway(
            "allowed_users = [\"42\"]",
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "Buy milk"}))])
                .reply_text("Added it."),
            planner.clone(),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "42", "buy milk", "1"))
            .await
            .expect("text handled");
        let confirm = channel.last_buttons()[0].clone();
        assert!(confirm.starts_with("confirm:"), "{confirm}");
        gw.handle_inbound(inbound(InboundMessageKind::Action, "42", &confirm, "2"))
            .await
            .expect("confirm handled");

        let sent = channel.sent();
        assert!(matches!(&sent[0], Sent::Send { content, buttons, .. } if content.contains("Buy milk") && buttons.len() == 3));
        assert_eq!(sent[1], Sent::Ack("cb-2".to_string()));
        assert_eq!(
            sent[2],
            Sent::Edit {
                message_id: "2".to_string(),
                content: "Confirmed".to_string(),
            }
        );
        assert_eq!(
            sent[3],
            Sent::Send {
                to: "42".to_string(),
                content: "Added it.".to_string(),
                buttons: Vec::new(),
            }
        );
        assert!(matches!(planner.mutations().as_slice(), [RecordedMutation::CreateTask(_)]));
    }

    #[tokio::test]
    async fn tapping_a_superseded_prompt_executes_nothing() {
        let planner = rent_planner();
        let (gw, channel, _tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "Buy milk"}))])
                .reply_tools(&[("r1", "get_tasks", json!({}))])
                .reply_tools(&[(
                    "p2",
                    "propose_delete_task",
                    json!({"task_id": "t1", "task_title": "Pay rent", "tasklist_id": "L1"}),
                )])
                .reply_text("Deleted."),
            planner.clone(),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "buy milk", "99"))
            .await
            .expect("text handled");
        let milk_buttons = channel.last_buttons();
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "what about rent", "101"))
            .await
            .expect("text handled");
        let rent_buttons = channel.last_buttons();
        assert!(channel.sent().iter().any(
            |s| matches!(s, Sent::Send { content, .. } if content.contains("**Delete Task**"))
        ));

        gw.handle_inbound(inbound(InboundMessageKind::Action, "9", &milk_buttons[0], "100"))
            .await
            .expect("stale confirm handled");
        assert!(planner.mutations().is_empty(), "{:?}", planner.mutations());
        assert_eq!(
            channel.sent().last(),
            Some(&Sent::Edit {
                message_id: "100".to_string(),
                content: "This proposal is no longer pending.".to_string(),
            })
        );

        gw.handle_inbound(inbound(InboundMessageKind::Action, "9", &rent_buttons[0], "102"))
            .await
            .expect("confirm handled");
        gw.handle_inbound(inbound(InboundMessageKind::Action, "9", &rent_buttons[0], "102"))
            .await
            .expect("double tap handled");
        assert_eq!(
            planner.mutations(),
            vec![RecordedMutation::DeleteTask {
                task_id: "t1".to_string(),
                tasklist_id: Some("L1".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn cancel_and_change_edit_prompt_in_place() {
        let (gw, channel, _tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "A"}))])
                .reply_tools(&[("p2", "propose_create_task", json!({"title": "B"}))]),
            Arc::new(InMemoryPlanner::new()),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "add A", "1"))
            .await
            .expect("text handled");
        let cancel = channel.last_buttons()[1].clone();
        gw.handle_inbound(inbound(InboundMessageKind::Action, "9", &cancel, "2"))
            .await
            .expect("cancel handled");
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "add B", "3"))
            .await
            .expect("text handled");
        let change = channel.last_buttons()[2].clone();
        gw.handle_inbound(inbound(InboundMessageKind::Action, "9", &change, "4"))
            .await
            .expect("change handled");

        let edits: Vec<String> = channel
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(edits[0], "Cancelled.");
        assert!(edits[1].starts_with("Current proposal:\n"), "{}", edits[1]);
        assert!(edits[1].contains("What would you like to change?"));
    }

    #[tokio::test]
    async fn commands_skip_the_agent() {
        let (gw, channel, _tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new(),
            Arc::new(InMemoryPlanner::new()),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "/help", "1"))
            .await
            .expect("command handled");
        assert!(matches!(&channel.sent()[0], Sent::Send { content, .. } if content.contains("/pending")));
    }

    #[tokio::test]
    async fn pending_command_resends_prompt_with_buttons() {
        let (gw, channel, _tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new()
                .reply_tools(&[("p1", "propose_create_task", json!({"title": "Buy milk"}))]),
            Arc::new(InMemoryPlanner::new()),
        );
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "buy milk", "1"))
            .await
            .expect("text handled");
        let original = channel.last_buttons();
        gw.handle_inbound(inbound(InboundMessageKind::Message, "9", "/pending", "2"))
            .await
            .expect("command handled");

        let sent = channel.sent();
        let Some(Sent::Send { content, buttons, .. }) = sent.last() else {
            panic!("expected a resent prompt, got {sent:?}");
        };
        assert!(content.contains("Buy milk"), "{content}");
        assert_eq!(buttons, &original);
    }

    #[tokio::test]
    async fn slow_turn_for_one_user_does_not_hold_up_another() {
        let gate = Arc::new(Notify::new());
        let (gw, channel, tx) = gateway(
            "allow_all_senders = true",
            GatedModel { gate: gate.clone() },
            Arc::new(InMemoryPlanner::new()),
        );
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(gw.clone().run_loop(shutdown.clone()));

        tx.send(inbound(InboundMessageKind::Message, "a", "slow", "1"))
            .await
            .expect("queued");
        tx.send(inbound(InboundMessageKind::Message, "b", "hello", "2"))
            .await
            .expect("queued");

        wait_for("b's reply", || !channel.replies_to("b").is_empty()).await;
        assert_eq!(channel.replies_to("b"), ["quick reply"]);
        assert!(channel.replies_to("a").is_empty());

        gate.notify_one();
        wait_for("a's reply", || !channel.replies_to("a").is_empty()).await;
        assert_eq!(channel.replies_to("a"), ["slow reply"]);

        shutdown.cancel();
        run.await.expect("join").expect("clean shutdown");
    }

    #[tokio::test]
    async fn one_users_messages_are_handled_in_order() {
        let (gw, channel, tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new().reply_text("first").reply_text("second"),
            Arc::new(InMemoryPlanner::new()),
        );
        let run = tokio::spawn(gw.clone().run_loop(CancellationToken::new()));
        tx.send(inbound(InboundMessageKind::Message, "9", "one", "1"))
            .await
            .expect("queued");
        tx.send(inbound(InboundMessageKind::Message, "9", "two", "2"))
            .await
            .expect("queued");
        drop(tx);
        run.await.expect("join").expect("loop ends when senders drop");
        assert_eq!(channel.replies_to("9"), ["first", "second"]);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let (gw, _channel, _tx) = gateway(
            "allow_all_senders = true",
            ScriptedModel::new(),
            Arc::new(InMemoryPlanner::new()),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        gw.run_loop(shutdown).await.expect("clean shutdown");
    }
}
