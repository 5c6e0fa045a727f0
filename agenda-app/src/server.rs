//! Runtime wiring for the `serve`, `chat` and `doctor` commands.

use crate::assistant::{AgentLoop, TurnOutcome};
use crate::commands;
use crate::config::AgendaConfig;
use crate::coordinator::{ConfirmationOutcome, Coordinator};
use crate::dev_backends::{self, Backends};
use crate::dispatcher::Dispatcher;
use crate::freshness::SystemClock;
use crate::gateway::Gateway;
use crate::session::{SessionManager, UserKey};
use agenda_channels::{ChannelAdapter, TelegramAdapter};
use agenda_llm::LlmClient;
use anyhow::Result;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

const CONSOLE_CHANNEL: &str = "console";
const CONSOLE_USER: &str = "local";

pub fn build_coordinator(cfg: &AgendaConfig, backends: Backends) -> Result<Coordinator> {
    let llm = LlmClient::new(cfg.llm_client_config()?)?;
    let agent = AgentLoop::new(
        Arc::new(llm),
        backends.reads,
        Arc::new(SystemClock),
        cfg.agent_settings()?,
    )?;
    Ok(Coordinator::new(
        SessionManager::new(cfg.agent.max_history_messages),
        agent,
        Dispatcher::new(backends.writes),
    ))
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AgendaConfig::load(config_path).await?;
    let llm = cfg.llm_client_config()?;
    tracing::info!(
        model = %llm.model,
        provider = llm.provider.as_str(),
        base_url = llm.base_url.as_deref().unwrap_or(llm.provider.default_base_url()),
        api_key_configured = llm.api_key.is_some(),
        timezone = %cfg.general.timezone,
        max_iterations = cfg.agent.max_iterations,
        freshness_ttl_secs = cfg.agent.freshness_ttl_secs,
        telegram_enabled = cfg.channels.telegram.enabled,
        google_configured = cfg.google.is_configured(),
        allowed_users = cfg.security.allowed_users.len(),
        allow_all_senders = cfg.security.allow_all_senders,
        "config ok"
    );
    if !cfg.google.is_configured() {
        tracing::warn!("google credentials missing; only --dev-backend will work");
    }
    if cfg.channels.telegram.enabled
        && cfg.security.allowed_users.is_empty()
        && !cfg.security.allow_all_senders
    {
        tracing::warn!(
            "security.allowed_users is empty; every sender will be rejected and logged"
        );
    }
    Ok(())
}

#[tracing::instrument(level = "info", skip_all, fields(dev_backend = dev_backend))]
pub async fn serve(config_path: Option<PathBuf>, dev_backend: bool) -> Result<()> {
    let cfg = AgendaConfig::load(config_path).await?;
    let started_at = Instant::now();
    let backends = dev_backends::build_backends(&cfg, dev_backend)?;
    let backend_name = backends.name;
    let coordinator = Arc::new(build_coordinator(&cfg, backends)?);
    tracing::info!(
        model = %coordinator.model(),
        provider = %cfg.general.provider,
        backend = backend_name,
        telegram_enabled = cfg.channels.telegram.enabled,
        "agenda starting"
    );

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(1024);
    let mut channels: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
    if cfg.channels.telegram.enabled {
        let telegram = &cfg.channels.telegram;
        let adapter = match telegram.api_base.as_deref() {
            Some(base) => TelegramAdapter::with_api_base(&telegram.bot_token, base)?,
            None => TelegramAdapter::new(&telegram.bot_token)?,
        };
        let adapter: Arc<dyn ChannelAdapter> = Arc::new(adapter);
        adapter.start(inbound_tx.clone()).await?;
        channels.insert(adapter.channel_id().to_string(), adapter);
    }
    if channels.is_empty() {
        return Err(anyhow::anyhow!(
            "no channels enabled; set [channels.telegram] enabled = true or use `agenda chat`"
        ));
    }
    drop(inbound_tx);

    let gateway = Arc::new(Gateway::new(
        cfg.clone(),
        started_at,
        coordinator,
        channels.clone(),
        inbound_rx,
    ));
    let shutdown = CancellationToken::new();
    let gateway_task = {
        let gateway = gateway.clone();
        let token = shutdown.child_token();
        tokio::spawn(async move { gateway.run_loop(token).await })
    };
    tracing::info!(
        channels = ?channels.keys().collect::<Vec<_>>(),
        "gateway started"
    );

    shutdown_signal(shutdown.clone()).await;
    match gateway_task.await {
        Ok(Ok(())) => tracing::info!("gateway shutdown completed"),
        Ok(Err(e)) => tracing::error!(error = %e, "gateway exited with error"),
        Err(e) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
    }
    Ok(())
}

/// Local REPL over stdin. While a proposal is pending, `y`, `n` and `c`
/// confirm, cancel or change it.
pub async fn chat(config_path: Option<PathBuf>, dev_backend: bool) -> Result<()> {
    let cfg = AgendaConfig::load(config_path).await?;
    let backends = dev_backends::build_backends(&cfg, dev_backend)?;
    let coordinator = build_coordinator(&cfg, backends)?;
    let user = UserKey::new(CONSOLE_CHANNEL, CONSOLE_USER);
    let started_at = Instant::now();

    println!("agenda chat ({}). Type /help for commands, ctrl-d to quit.", coordinator.model());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let pending = coordinator.pending_summary(&user).await.pending > 0;
        let reply = match (pending, input.to_ascii_lowercase().as_str()) {
            (true, "y" | "yes") => match coordinator.handle_confirm(&user, None).await {
                ConfirmationOutcome::Next { ack, prompt } => {
                    format!("{ack}\n\n{}", with_hint(prompt.text))
                }
                ConfirmationOutcome::Finished { ack, follow_up } => {
                    format!("{ack}\n\n{}", render_turn(follow_up))
                }
                other => other.ack().to_string(),
            },
            (true, "n" | "no") => coordinator.handle_cancel(&user, None).await.message(),
            (true, "c") => coordinator.handle_change_request(&user, None).await.message(),
            _ => match commands::handle_command(
                &cfg,
                &coordinator,
                &user,
                input,
                started_at.elapsed(),
            )
            .await
            {
                Some(reply) => render_turn(reply),
                None => render_turn(coordinator.handle_user_text(&user, input).await),
            },
        };
        println!("{reply}\n");
    }
}

fn render_turn(outcome: TurnOutcome) -> String {
    match outcome {
        TurnOutcome::FinalText(text) => text,
        TurnOutcome::AwaitingConfirmation(prompt) => with_hint(prompt.text),
    }
}

fn with_hint(prompt: String) -> String {
    format!("{prompt} [y]es / [n]o / [c]hange")
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ActivePrompt;

    #[test]
    fn coordinator_builds_against_dev_backend() {
        let cfg = AgendaConfig::parse("[general]\nmodel = \"qwen3:14b\"\nprovider = \"ollama\"\n")
            .expect("config parses");
        let backends = dev_backends::build_backends(&cfg, true).expect("dev backend");
        let coordinator = build_coordinator(&cfg, backends).expect("coordinator builds");
        assert_eq!(coordinator.model(), "qwen3:14b");
    }

    #[test]
    fn prompts_carry_the_answer_hint() {
        let rendered = render_turn(TurnOutcome::AwaitingConfirmation(ActivePrompt {
            proposal_id: "a1".to_string(),
            text: "Proposed action:\n\n**Create Task**\n  Title: A\n\nConfirm?".to_string(),
        }));
        assert!(rendered.ends_with("Confirm? [y]es / [n]o / [c]hange"));
    }

    #[tokio::test]
    async fn cancelled_token_ends_shutdown_wait() {
        let token = CancellationToken::new();
        token.cancel();
        shutdown_signal(token.clone()).await;
        assert!(token.is_cancelled());
    }
}
