//! Agent initialisation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    listeners::{ConnectionEvent, EventKind},
    protocol::ClientAction,
    session::ConsoleSession,
};

/// Initialisation gave up before the connection opened.
///
/// The connection manager keeps retrying in the background.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Connection failed before opening: {0}")]
    Connection(String),
}

/// Settings sent with the `initialize` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(rename = "LLM_MODEL", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "AGENT", default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(rename = "LANGUAGE", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "LLM_API_KEY", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Connect and, for a new session, initialise the agent.
///
/// With a `user_id` the backend resumes that user's agent and no
/// `initialize` action is sent. Resolves once the connection is open.
///
/// # Errors
/// Returns `InitError` with the first connection error raised before the
/// connection opens.
pub async fn initialize_agent(
    session: &ConsoleSession,
    user_id: Option<String>,
    settings: &AgentSettings,
) -> Result<(), InitError> {
    let manager = session.manager();
    let resuming = user_id.is_some();
    let label = user_id.clone().unwrap_or_default();

    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let listener = manager.register_listener(EventKind::Error, move |event| {
        if let ConnectionEvent::Error(e) = event {
            let _ = error_tx.send(e.to_string());
        }
    });

    manager.connect(user_id);
    let failure = tokio::select! {
        () = manager.wait_until_open() => None,
        Some(message) = error_rx.recv() => Some(message),
    };
    manager.remove_listener(listener);

    if let Some(message) = failure {
        tracing::warn!("Agent initialization failed: {message}");
        return Err(InitError::Connection(message));
    }

    if !resuming {
        let args = serde_json::to_value(settings).unwrap_or_default();
        manager.send(ClientAction::initialize(args).to_frame());
    }
    session
        .notifier()
        .info(format!("Agent initialized for user {label}"));
    Ok(())
}
