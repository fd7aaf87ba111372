//! Connection manager: connect / authenticate / retry state machine.
//!
//! ```text
//! Idle ──connect()──▶ Authenticating ──token ok, socket open──▶ Open
//!  ▲                        │                                     │
//!  └──token or open fails───┘        (retry after 1.5 s)          │
//!  └──────────────unsolicited close (retry after 3 s)─────────────┘
//! close() from any state ──▶ Closed (no automatic retry)
//! ```
//!
//! Failures never reach callers of `connect` or `send`: they surface as a
//! sticky notification under [`CONNECTION_NOTICE_KEY`] and an `Error` event,
//! and the manager keeps retrying with fixed delays, without limit.
//!
//! Every attempt carries a generation number. `connect` and `close` each start
//! a new generation, and only the attempt holding the current one may change
//! the state or publish its sender, so an attempt outlived by a `close` can
//! never disturb its successor.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use agent_console_core::{Notifier, SessionError, TransportError};
use agent_console_session::{CredentialProvider, ReconnectPolicy, SessionConfig, config::endpoint};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc, watch};
use url::Url;
use uuid::Uuid;

use crate::{
    connector::{Connector, Frame, Socket},
    dispatcher::Dispatcher,
    listeners::{ConnectionEvent, EventKind, ListenerId, ListenerRegistry},
};

/// Notification key shared by every connection status message.
pub const CONNECTION_NOTICE_KEY: &str = "ws";

const RETRY_MESSAGE: &str = "Connection failed. Retry...";
const CONNECTED_MESSAGE: &str = "Connected to server.";

/// Time the writer gets to flush and send a close frame.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; an automatic retry may be pending.
    Idle,
    /// Fetching a token or opening the socket.
    Authenticating,
    Open,
    /// Closed on request; no automatic retry.
    Closed,
}

/// The live attempt's slot.
struct Link {
    generation: u64,
    /// Published once the `Opened` listeners have run.
    outbound: Option<mpsc::UnboundedSender<String>>,
    stop: Arc<Notify>,
}

/// Identity of one connection attempt.
struct Attempt {
    id: Uuid,
    generation: u64,
    stop: Arc<Notify>,
}

enum Delivery {
    Sent,
    Retry(String),
    Failed,
}

/// Owns the single transport to the backend.
pub struct ConnectionManager {
    credentials: Arc<CredentialProvider>,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<Notifier>,
    listeners: ListenerRegistry,
    socket_base: Url,
    reconnect: ReconnectPolicy,
    send_retry_delay: Duration,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
    user_id: Mutex<Option<String>>,
}

impl ConnectionManager {
    /// Create an idle manager. Nothing happens until `connect` or `send`.
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        credentials: Arc<CredentialProvider>,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<Notifier>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Arc::new(Self {
            credentials,
            connector,
            dispatcher,
            notifier,
            listeners: ListenerRegistry::new(),
            socket_base: config.websocket_base(),
            reconnect: config.reconnect.clone(),
            send_retry_delay: config.send_retry_delay(),
            state,
            link: Mutex::new(Link {
                generation: 0,
                outbound: None,
                stop: Arc::new(Notify::new()),
            }),
            user_id: Mutex::new(None),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Resolve once the connection is open.
    pub async fn wait_until_open(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| *s == ConnectionState::Open).await;
    }

    /// Start connecting.
    ///
    /// A no-op (logged) while already authenticating or open. `user_id` is
    /// remembered and reused by automatic reconnects; `None` keeps the last one.
    pub fn connect(self: &Arc<Self>, user_id: Option<String>) {
        if user_id.is_some() {
            *self.user_id.lock().unwrap_or_else(PoisonError::into_inner) = user_id;
        }

        let attempt = {
            let mut link = self.lock_link();
            let started = self.state.send_if_modified(|state| match state {
                ConnectionState::Idle | ConnectionState::Closed => {
                    *state = ConnectionState::Authenticating;
                    true
                }
                ConnectionState::Authenticating | ConnectionState::Open => false,
            });
            started.then(|| {
                link.generation += 1;
                link.outbound = None;
                link.stop = Arc::new(Notify::new());
                Attempt {
                    id: Uuid::new_v4(),
                    generation: link.generation,
                    stop: Arc::clone(&link.stop),
                }
            })
        };

        let Some(attempt) = attempt else {
            if self.state() == ConnectionState::Authenticating {
                self.notifier.debug_info("Socket is initializing");
            }
            return;
        };

        let user_id = self.user_id.lock().unwrap_or_else(PoisonError::into_inner).clone();
        tokio::spawn(Arc::clone(self).run(attempt, user_id));
    }

    /// Send a text frame.
    ///
    /// Not queued: when the connection is not ready this starts connecting and
    /// retries the same payload after a fixed delay, for as long as a
    /// connection attempt is in progress. A send issued while the `Opened`
    /// listeners are still running is retried the same way. Ordering across a
    /// reconnect is therefore best-effort only.
    pub fn send(self: &Arc<Self>, payload: impl Into<String>) {
        let payload = payload.into();

        if !self.is_open() {
            self.connect(None);
        }

        let delivery = {
            let link = self.lock_link();
            match (self.state(), link.outbound.as_ref()) {
                (ConnectionState::Open, Some(tx)) => match tx.send(payload) {
                    Ok(()) => Delivery::Sent,
                    // Writer gone: the socket is failing.
                    Err(_) => Delivery::Failed,
                },
                (ConnectionState::Authenticating | ConnectionState::Open, _) => {
                    Delivery::Retry(payload)
                }
                (ConnectionState::Idle | ConnectionState::Closed, _) => Delivery::Failed,
            }
        };

        match delivery {
            Delivery::Sent => {}
            Delivery::Retry(payload) => {
                let manager = Arc::clone(self);
                let delay = self.send_retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.send(payload);
                });
            }
            Delivery::Failed => self.report(TransportError::NotConnected.into()),
        }
    }

    /// Close the connection on request. No automatic reconnect follows.
    ///
    /// The writer gets a short grace period to flush and send a close frame.
    pub fn close(&self) {
        let previous = {
            let mut link = self.lock_link();
            link.generation += 1;
            link.outbound = None;
            link.stop.notify_one();
            self.state.send_replace(ConnectionState::Closed)
        };
        if previous != ConnectionState::Closed {
            tracing::info!(?previous, "Connection closed on request");
        }
    }

    /// Append a listener for `kind`.
    pub fn register_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.listeners.register(kind, callback)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, attempt: &Attempt) -> bool {
        self.lock_link().generation == attempt.generation
    }

    /// Move `from -> to`, only on behalf of the current attempt.
    fn transition(&self, attempt: &Attempt, from: ConnectionState, to: ConnectionState) -> bool {
        let link = self.lock_link();
        link.generation == attempt.generation
            && self.state.send_if_modified(|state| {
                if *state == from {
                    *state = to;
                    true
                } else {
                    false
                }
            })
    }

    /// Socket URL for `token`, with `uid` when known.
    fn socket_url(&self, token: &str, user_id: Option<&str>) -> Url {
        let mut url = endpoint(&self.socket_base, "ws");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", token);
            if let Some(uid) = user_id {
                query.append_pair("uid", uid);
            }
        }
        url
    }

    /// One connection attempt, from token to close.
    async fn run(self: Arc<Self>, attempt: Attempt, user_id: Option<String>) {
        tracing::debug!(attempt = %attempt.id, ?user_id, "Connecting");

        let token = match self.credentials.get_token(user_id.as_deref()).await {
            Ok(token) => token,
            Err(e) => return self.fail_attempt(&attempt, e.into()),
        };
        if !self.is_current(&attempt) {
            tracing::debug!(attempt = %attempt.id, "Attempt superseded before opening");
            return;
        }

        let url = self.socket_url(token.as_str(), user_id.as_deref());
        let socket = match self.connector.open(&url).await {
            Ok(socket) => socket,
            Err(e) => return self.fail_attempt(&attempt, e.into()),
        };

        if !self.transition(&attempt, ConnectionState::Authenticating, ConnectionState::Open) {
            tracing::debug!(attempt = %attempt.id, "Attempt superseded, dropping socket");
            return;
        }

        tracing::info!(attempt = %attempt.id, "Connection open");
        self.notifier.sticky_success(CONNECTION_NOTICE_KEY, CONNECTED_MESSAGE);
        self.listeners.emit(&ConnectionEvent::Opened);

        // Sends are accepted only once every `Opened` listener has run.
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut link = self.lock_link();
            if link.generation == attempt.generation {
                link.outbound = Some(tx);
            }
        }

        self.pump(&attempt, socket, rx).await;

        let solicited =
            !self.transition(&attempt, ConnectionState::Open, ConnectionState::Idle);
        tracing::info!(attempt = %attempt.id, solicited, "Connection closed");
        self.listeners.emit(&ConnectionEvent::Closed { solicited });
        if !solicited {
            self.schedule_reconnect(self.reconnect.after_drop());
        }
    }

    /// Forward outbound payloads and inbound frames until the socket ends or
    /// the attempt is stopped.
    async fn pump(&self, attempt: &Attempt, socket: Socket, mut rx: mpsc::UnboundedReceiver<String>) {
        let Socket { mut sink, mut stream } = socket;
        let id = attempt.id;

        let mut writer = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if let Err(e) = sink.send(payload).await {
                    tracing::warn!(attempt = %id, "Failed to send frame: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_frame(text),
                    Some(Ok(Frame::Close)) | None => break,
                    // Stays open until the transport itself closes.
                    Some(Err(e)) => self.report(e.into()),
                },
                () = attempt.stop.notified() => break,
            }
        }

        // Dropping the sender ends the writer, which closes the sink.
        {
            let mut link = self.lock_link();
            if link.generation == attempt.generation {
                link.outbound = None;
            }
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            tracing::debug!(attempt = %id, "Writer did not finish, aborting");
            writer.abort();
        }
    }

    fn handle_frame(&self, text: String) {
        self.listeners.emit(&ConnectionEvent::Message(text.clone()));
        if let Err(e) = self.dispatcher.dispatch_text(&text) {
            tracing::error!("Protocol violation in inbound frame: {e}");
            self.listeners.emit(&ConnectionEvent::Error(e.into()));
        }
    }

    fn fail_attempt(self: &Arc<Self>, attempt: &Attempt, error: SessionError) {
        if !self.transition(attempt, ConnectionState::Authenticating, ConnectionState::Idle) {
            tracing::debug!(attempt = %attempt.id, "Superseded attempt failed: {error}");
            return;
        }
        tracing::warn!(attempt = %attempt.id, "Connection attempt failed: {error}");
        self.report(error);
        self.schedule_reconnect(self.reconnect.after_failure());
    }

    /// Surface a recoverable failure: sticky banner plus `Error` event.
    fn report(&self, error: SessionError) {
        self.notifier.sticky_error(CONNECTION_NOTICE_KEY, RETRY_MESSAGE);
        self.listeners.emit(&ConnectionEvent::Error(error));
    }

    fn schedule_reconnect(self: &Arc<Self>, delay: Duration) {
        tracing::debug!(?delay, "Scheduling reconnect");
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.state() == ConnectionState::Idle {
                manager.connect(None);
            }
        });
    }
}
