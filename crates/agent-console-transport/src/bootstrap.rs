//! History and plan replay on (re)connection.

use std::sync::Arc;

use agent_console_core::{
    Notifier, Role, SessionBackend, SessionError, StateSink, StateUpdate,
};

use crate::{
    connection::{CONNECTION_NOTICE_KEY, ConnectionManager},
    dispatcher::Dispatcher,
    listeners::{EventKind, ListenerId},
};

const FETCH_FAILED_MESSAGE: &str = "Error fetching the session";

/// Outcome of one replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// User entries projected into the conversation.
    pub user_messages: usize,
    /// Assistant entries run back through the dispatcher.
    pub assistant_messages: usize,
    pub plan_applied: bool,
    /// Fetch failures and malformed assistant entries.
    pub errors: Vec<SessionError>,
}

impl ReplayReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Rehydrates consumer state from the backend after every connect.
///
/// User history entries are projected directly; assistant entries go through
/// the same [`Dispatcher`] as live frames, so replayed and live actions land
/// identically. The message and plan fetches are independent: either may fail
/// without undoing the other.
pub struct SessionBootstrap {
    backend: Arc<dyn SessionBackend>,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn StateSink>,
    notifier: Arc<Notifier>,
}

impl SessionBootstrap {
    #[must_use]
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        dispatcher: Arc<Dispatcher>,
        sink: Arc<dyn StateSink>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            sink,
            notifier,
        }
    }

    /// Replay history, then the plan.
    ///
    /// Failures are collected in the report and surfaced as a single sticky
    /// notification; they never abort the other fetch.
    pub async fn resume_session(&self) -> ReplayReport {
        let mut report = ReplayReport::default();

        match self.backend.fetch_messages().await {
            Ok(entries) => {
                self.notifier
                    .debug_info(format!("Fetched {} messages from the session", entries.len()));
                for entry in entries {
                    match entry.role {
                        Role::User => {
                            self.sink.apply(StateUpdate::AddUserMessage(entry.payload));
                            report.user_messages += 1;
                        }
                        Role::Assistant => match self.dispatcher.dispatch_value(entry.payload) {
                            Ok(route) => {
                                tracing::debug!(?route, "Replayed assistant message");
                                report.assistant_messages += 1;
                            }
                            Err(e) => {
                                tracing::error!("Malformed assistant message in history: {e}");
                                report.errors.push(e.into());
                            }
                        },
                    }
                }
            }
            Err(e) => {
                tracing::warn!("History fetch failed: {e}");
                report.errors.push(e.into());
            }
        }

        match self.backend.fetch_plan().await {
            Ok(plan) => {
                self.sink.apply(StateUpdate::SetPlan(plan));
                report.plan_applied = true;
            }
            Err(e) => {
                tracing::warn!("Plan fetch failed: {e}");
                report.errors.push(e.into());
            }
        }

        if !report.is_complete() {
            self.notifier.sticky_error(CONNECTION_NOTICE_KEY, FETCH_FAILED_MESSAGE);
        }
        tracing::info!(
            user = report.user_messages,
            assistant = report.assistant_messages,
            plan = report.plan_applied,
            errors = report.errors.len(),
            "Session replayed"
        );
        report
    }

    /// Replay on every `Opened` event of `manager`.
    pub fn attach(self: &Arc<Self>, manager: &ConnectionManager) -> ListenerId {
        let bootstrap = Arc::clone(self);
        manager.register_listener(EventKind::Opened, move |_| {
            let bootstrap = Arc::clone(&bootstrap);
            tokio::spawn(async move {
                bootstrap.resume_session().await;
            });
        })
    }
}
