//! Slash commands handled before anything reaches the agent.

use crate::assistant::TurnOutcome;
use crate::config::AgendaConfig;
use crate::coordinator::Coordinator;
use crate::session::UserKey;
use std::time::Duration;

const GREETING: &str = "Hi! I'm your personal assistant. I can help you manage your calendar and tasks.\nJust talk to me naturally and I'll do my best to help!";

const HELP: &str = "Just tell me what you need, e.g. \"what's on tomorrow?\" or \"remind me to pay rent on Friday\".\n\
Every change to your calendar or tasks is shown to you first and only happens after you confirm.\n\n\
Commands:\n\
/new - start a fresh conversation\n\
/pending - show the action waiting for your confirmation\n\
/status - model and queue status\n\
/help - this message";

/// `None` when `input` is not a command. `/pending` re-presents the active
/// proposal as a prompt so it can still be answered.
pub async fn handle_command(
    cfg: &AgendaConfig,
    coordinator: &Coordinator,
    user: &UserKey,
    input: &str,
    uptime: Duration,
) -> Option<TurnOutcome> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    // Telegram appends the bot name in groups: /status@agenda_bot
    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .split('@')
        .next()
        .unwrap_or_default();

    let reply = match command {
        "/start" => {
            coordinator.reset_session(user).await;
            GREETING.to_string()
        }
        "/new" => {
            coordinator.reset_session(user).await;
            "Session reset.".to_string()
        }
        "/help" => HELP.to_string(),
        "/pending" => {
            return Some(match coordinator.pending_summary(user).await.prompt {
                Some(prompt) => TurnOutcome::AwaitingConfirmation(prompt),
                None => TurnOutcome::FinalText("No pending actions.".to_string()),
            });
        }
        "/status" => {
            let summary = coordinator.pending_summary(user).await;
            format!(
                "model={}\nprovider={}\npending={}\nhistory_messages={}\nsessions={}\nuptime_seconds={}",
                coordinator.model(),
                cfg.general.provider,
                summary.pending,
                summary.history_messages,
                coordinator.active_sessions(),
                uptime.as_secs()
            )
        }
        _ => "Unknown command. Supported: /start /new /pending /status /help".to_string(),
    };
    Some(TurnOutcome::FinalText(reply))
}
