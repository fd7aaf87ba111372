//! Connection event listeners.

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use agent_console_core::SessionError;

/// Kind of connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Opened,
    Message,
    Error,
    Closed,
}

/// A connection event, as delivered to listeners.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The socket reached the open state.
    Opened,
    /// Raw inbound text frame, before dispatch.
    Message(String),
    /// A failure: auth, transport, or a malformed inbound frame.
    Error(SessionError),
    /// The socket closed. `solicited` is true when a caller asked for it.
    Closed { solicited: bool },
}

impl ConnectionEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Opened => EventKind::Opened,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Closed { .. } => EventKind::Closed,
        }
    }
}

/// Handle returned by registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Ordered callbacks per event kind.
///
/// Callbacks fire in registration order. A callback registered while an
/// event is being emitted first sees the next event: each emission works on
/// a snapshot, and no lock is held while callbacks run, so callbacks may
/// register or remove listeners themselves.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Callback)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the listeners of `kind`.
    pub fn register<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        for callbacks in listeners.values_mut() {
            if let Some(pos) = callbacks.iter().position(|(lid, _)| *lid == id) {
                callbacks.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of listeners for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener of the event's kind, in registration order.
    pub fn emit(&self, event: &ConnectionEvent) {
        let snapshot: Vec<Callback> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .map(|callbacks| callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in snapshot {
            callback(event);
        }
    }
}
