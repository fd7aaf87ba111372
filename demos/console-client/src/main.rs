//! Headless agent console.
//!
//! Run with: cargo run -p console-client -- [--config PATH] [--user ID]
//!
//! Each line read from stdin is sent to the agent as a chat message; `/clear`
//! drops the server-side history. Every state update and notification is
//! logged.

use std::{path::PathBuf, sync::Arc};

use agent_console_core::{StateSink, StateUpdate};
use agent_console_session::{HttpBackend, SessionConfig, storage::FileTokenStore};
use agent_console_transport::{AgentSettings, ClientAction, ConsoleSession, initialize_agent};
use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs every projected update.
struct LoggingSink;

impl StateSink for LoggingSink {
    fn apply(&self, update: StateUpdate) {
        match update {
            StateUpdate::AddAssistantMessage(text) => tracing::info!("agent: {text}"),
            other => tracing::info!(update = ?other, "State update"),
        }
    }
}

/// Chat with the agent from stdin.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Session config file (JSON). Missing files fall back to defaults.
    #[arg(long, env = "AGENT_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Resume this user's agent instead of initializing a new one.
    #[arg(long = "user", value_name = "ID")]
    user_id: Option<String>,
}

fn settings_from_env() -> AgentSettings {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    AgentSettings {
        model: var("LLM_MODEL"),
        agent: var("AGENT"),
        language: var("LANGUAGE"),
        api_key: var("LLM_API_KEY"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = SessionConfig::load(args.config.as_deref()).context("Failed to load config")?;
    tracing::info!(backend = %config.backend_url, socket = %config.websocket_base(), "Starting console");

    let store = Arc::new(FileTokenStore::new(config.token_file()));
    let backend = Arc::new(HttpBackend::new(&config, store.clone())?);
    let session = ConsoleSession::builder(config)
        .token_store(store)
        .backend(backend.clone())
        .sink(Arc::new(LoggingSink))
        .build()?;

    let mut notices = session.notifier().stream();
    tokio::spawn(async move {
        while let Some(notice) = notices.next().await {
            tracing::debug!(key = ?notice.key, level = ?notice.level, "{}", notice.message);
        }
    });

    session.bootstrap().attach(session.manager());
    let settings = settings_from_env();
    if let Err(e) = initialize_agent(&session, args.user_id, &settings).await {
        // The connection keeps retrying in the background.
        tracing::warn!("{e}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/clear" => match backend.clear_messages().await {
                        Ok(()) => tracing::info!("Session history cleared"),
                        Err(e) => tracing::warn!("Failed to clear history: {e}"),
                    },
                    text => session.manager().send(ClientAction::message(text).to_frame()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown();
    Ok(())
}
