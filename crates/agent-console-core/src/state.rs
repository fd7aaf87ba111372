//! Projection vocabulary for downstream state consumers.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use crate::Plan;

/// A single change the session layer asks downstream state to make.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Drop the conversation display.
    ClearMessages,
    /// Browser location.
    SetUrl(String),
    /// Browser screenshot (data URL or base64).
    SetScreenshot(String),
    /// Path of the file shown in the editor.
    UpdatePath(String),
    /// Contents of the file shown in the editor.
    SetCode(String),
    AddAssistantMessage(String),
    /// User message replayed from history, as recorded by the backend.
    AddUserMessage(Value),
    /// Shell command issued by the agent.
    AppendCommand(String),
    /// Notebook cell issued by the agent.
    AppendNotebookInput(String),
    SetPlan(Plan),
    ResetPlan,
    ResetBrowser,
    /// Observation frame, forwarded untouched.
    Observation(Value),
}

/// Receiver of state updates.
///
/// Implementations must not block: `apply` is called from the socket reader.
pub trait StateSink: Send + Sync {
    fn apply(&self, update: StateUpdate);
}

/// In-memory sink that records every update.
///
/// Useful for headless consumers and tests.
pub struct MemorySink {
    updates: Mutex<Vec<StateUpdate>>,
    len: watch::Sender<usize>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self {
            updates: Mutex::new(Vec::new()),
            len,
        }
    }

    /// Snapshot of the recorded updates, in arrival order.
    #[must_use]
    pub fn updates(&self) -> Vec<StateUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded updates.
    #[must_use]
    pub fn len(&self) -> usize {
        *self.len.borrow()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` updates have been recorded.
    pub async fn wait_for_len(&self, count: usize) {
        let mut rx = self.len.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|len| *len >= count).await;
    }
}

impl StateSink for MemorySink {
    fn apply(&self, update: StateUpdate) {
        let len = {
            let mut updates = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
            updates.push(update);
            updates.len()
        };
        self.len.send_replace(len);
    }
}
