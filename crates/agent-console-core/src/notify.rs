//! Sticky status notifications with broadcast support.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Live listener buffer.
const CHANNEL_CAPACITY: usize = 256;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
    Debug,
}

/// A user-facing status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// De-duplication key; `None` for transient notices.
    pub key: Option<String>,
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    /// Whether this notice stays up until replaced or dismissed.
    #[must_use]
    pub const fn is_sticky(&self) -> bool {
        self.key.is_some()
    }
}

/// Board of sticky notices keyed by identifier.
///
/// A notice posted under an existing key replaces the previous one in place,
/// so repeated failures never stack. Transient notices are only broadcast.
pub struct Notifier {
    sticky: RwLock<Vec<Notice>>,
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sticky: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Post a sticky error under `key`.
    pub fn sticky_error(&self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(key, "{message}");
        self.post_sticky(key, NoticeLevel::Error, message);
    }

    /// Post a sticky success under `key`, replacing any error there.
    pub fn sticky_success(&self, key: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(key, "{message}");
        self.post_sticky(key, NoticeLevel::Success, message);
    }

    /// Broadcast a transient informational notice.
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.broadcast(Notice {
            key: None,
            level: NoticeLevel::Info,
            message,
        });
    }

    /// Broadcast a transient debug notice.
    pub fn debug_info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.broadcast(Notice {
            key: None,
            level: NoticeLevel::Debug,
            message,
        });
    }

    /// Remove the sticky notice under `key`. Returns whether one existed.
    pub fn dismiss(&self, key: &str) -> bool {
        let mut sticky = self.sticky.write().unwrap_or_else(PoisonError::into_inner);
        let before = sticky.len();
        sticky.retain(|n| n.key.as_deref() != Some(key));
        before != sticky.len()
    }

    /// Current sticky notice under `key`.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<Notice> {
        self.sticky
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|n| n.key.as_deref() == Some(key))
            .cloned()
    }

    /// Snapshot of all sticky notices, in first-posted order.
    #[must_use]
    pub fn sticky(&self) -> Vec<Notice> {
        self.sticky
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get a receiver for live notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Stream that yields the current sticky notices first, then live ones.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, Notice> {
        let (current, rx) = (self.sticky(), self.subscribe());

        let current = futures::stream::iter(current);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(current.chain(live))
    }

    fn post_sticky(&self, key: &str, level: NoticeLevel, message: String) {
        let notice = Notice {
            key: Some(key.to_string()),
            level,
            message,
        };
        {
            let mut sticky = self.sticky.write().unwrap_or_else(PoisonError::into_inner);
            match sticky.iter_mut().find(|n| n.key.as_deref() == Some(key)) {
                Some(existing) => *existing = notice.clone(),
                None => sticky.push(notice.clone()),
            }
        }
        self.broadcast(notice);
    }

    fn broadcast(&self, notice: Notice) {
        let _ = self.sender.send(notice); // no live listeners is fine
    }
}
