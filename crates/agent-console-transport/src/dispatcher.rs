//! Inbound message classification and routing.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use agent_console_core::{ProtocolError, SessionBackend, StateSink, StateUpdate};
use serde_json::Value;

use crate::protocol::{ActionKind, ActionMessage, InboundMessage};

/// Where a frame went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Handled by the action table.
    Action(ActionKind),
    /// Forwarded to the observation path.
    Observation,
    /// Action the console has no handler for; dropped.
    Ignored { action: String },
}

/// Projection of an action into state updates.
///
/// Pure: reads fields of `message`, never touches the network.
#[must_use]
pub fn project(kind: ActionKind, message: &ActionMessage) -> Vec<StateUpdate> {
    let text = |key: &str| message.arg_str(key).map(str::to_string);
    let mut updates = Vec::new();

    match kind {
        ActionKind::Init => updates.push(StateUpdate::ClearMessages),
        ActionKind::Browse => {
            updates.extend(text("url").map(StateUpdate::SetUrl));
            updates.extend(text("screenshotSrc").map(StateUpdate::SetScreenshot));
        }
        ActionKind::Write => {
            updates.extend(text("path").map(StateUpdate::UpdatePath));
            updates.extend(text("content").map(StateUpdate::SetCode));
        }
        ActionKind::Message => {
            updates.extend(text("content").map(StateUpdate::AddAssistantMessage));
        }
        ActionKind::Finish => {
            updates.extend(message.message.clone().map(StateUpdate::AddAssistantMessage));
        }
        ActionKind::Run => {
            updates.extend(thought(message));
            updates.extend(text("command").map(StateUpdate::AppendCommand));
        }
        ActionKind::RunIpython => {
            updates.extend(thought(message));
            updates.extend(text("code").map(StateUpdate::AppendNotebookInput));
        }
        // Plan refreshes are asynchronous, see `Dispatcher::refresh_plan`.
        ActionKind::AddTask | ActionKind::ModifyTask => {}
        ActionKind::ClearMessages => {
            updates.push(StateUpdate::ClearMessages);
            updates.push(StateUpdate::ResetBrowser);
            updates.push(StateUpdate::ResetPlan);
        }
    }
    updates
}

fn thought(message: &ActionMessage) -> Option<StateUpdate> {
    message
        .arg_str("thought")
        .filter(|t| !t.is_empty())
        .map(|t| StateUpdate::AddAssistantMessage(t.to_string()))
}

/// Whether handling `kind` requires refetching the plan.
#[must_use]
pub const fn refreshes_plan(kind: ActionKind) -> bool {
    matches!(kind, ActionKind::AddTask | ActionKind::ModifyTask)
}

/// Routes inbound frames to the action table or the observation path.
pub struct Dispatcher {
    sink: Arc<dyn StateSink>,
    backend: Arc<dyn SessionBackend>,
    ignored: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher projecting into `sink`.
    ///
    /// `backend` is only used by the plan-refreshing actions.
    #[must_use]
    pub fn new(sink: Arc<dyn StateSink>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            sink,
            backend,
            ignored: AtomicU64::new(0),
        }
    }

    /// Parse and dispatch a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError` if the frame is malformed. Nothing is applied
    /// in that case.
    pub fn dispatch_text(&self, raw: &str) -> Result<Route, ProtocolError> {
        Ok(self.dispatch(InboundMessage::parse(raw)?))
    }

    /// Dispatch an already-parsed frame. A JSON string is treated as a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError` if the frame is malformed.
    pub fn dispatch_value(&self, value: Value) -> Result<Route, ProtocolError> {
        match value {
            Value::String(raw) => self.dispatch_text(&raw),
            other => Ok(self.dispatch(InboundMessage::from_value(other)?)),
        }
    }

    /// Dispatch a classified frame.
    ///
    /// Plan-refreshing actions spawn a background fetch and return immediately;
    /// this must be called from within a Tokio runtime.
    pub fn dispatch(&self, message: InboundMessage) -> Route {
        match message {
            InboundMessage::Observation(value) => {
                self.sink.apply(StateUpdate::Observation(value));
                Route::Observation
            }
            InboundMessage::Action(action) => {
                let Some(kind) = action.kind() else {
                    let total = self.ignored.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(action = %action.action, total, "Ignoring unhandled action");
                    return Route::Ignored {
                        action: action.action,
                    };
                };

                for update in project(kind, &action) {
                    self.sink.apply(update);
                }
                if refreshes_plan(kind) {
                    self.refresh_plan();
                }
                Route::Action(kind)
            }
        }
    }

    /// Number of actions dropped for lack of a handler.
    #[must_use]
    pub fn ignored_count(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    fn refresh_plan(&self) {
        let sink = Arc::clone(&self.sink);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.fetch_plan().await {
                Ok(plan) => sink.apply(StateUpdate::SetPlan(plan)),
                Err(e) => tracing::warn!("Plan refresh failed: {e}"),
            }
        });
    }
}
