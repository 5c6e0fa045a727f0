//! Agenda: a calendar and task assistant that never writes without asking.

mod assistant;
mod catalog;
mod commands;
mod config;
mod conversation;
mod coordinator;
mod dev_backends;
mod dispatcher;
mod freshness;
mod gateway;
mod init;
mod proposal;
mod queue;
mod server;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "agenda", version, about = "Confirm-before-write calendar and task assistant")]
struct Cli {
    /// Config file (default: ~/.agenda/config.toml).
    #[arg(long, global = true, env = "AGENDA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the chat gateway (default).
    Serve {
        /// Use the in-memory planner instead of Google Calendar/Tasks.
        #[arg(long)]
        dev_backend: bool,
    },
    /// Write ~/.agenda/config.toml from the bundled template (idempotent).
    Init,
    /// Validate config and report what is configured.
    Doctor,
    /// Talk to the assistant from this terminal.
    Chat {
        #[arg(long)]
        dev_backend: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("load .env: {e}"));
        }
    }
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { dev_backend: false });

    match command {
        Command::Serve { dev_backend } => server::serve(cli.config, dev_backend).await,
        Command::Init => {
            let report = init::initialize(cli.config).await?;
            if report.created.is_empty() {
                println!("agenda init: already initialized at {}", report.root.display());
            } else {
                println!("agenda init: initialized {}", report.root.display());
                for path in &report.created {
                    println!("created {}", path.display());
                }
                if !report.skipped.is_empty() {
                    println!("kept {} existing file(s) unchanged", report.skipped.len());
                }
            }
            println!("next: set model and credentials in {}", report.root.display());
            Ok(())
        }
        Command::Doctor => server::doctor(cli.config).await,
        Command::Chat { dev_backend } => server::chat(cli.config, dev_backend).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,agenda=debug,agenda_app=debug,agenda_llm=debug,agenda_tools=debug,agenda_channels=debug",
        ),
    };
    let log_format = std::env::var("AGENDA_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported AGENDA_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
