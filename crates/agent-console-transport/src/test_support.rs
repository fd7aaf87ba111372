//! Scripted backend and in-memory connector for unit tests.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use agent_console_core::{
    AuthError, FetchError, HistoryEntry, Plan, SessionBackend, TransportError,
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use futures::{Sink, StreamExt, channel::mpsc as fmpsc};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use url::Url;

use crate::connector::{Connector, Frame, Socket};

/// A token the credential layer accepts.
pub fn valid_token(sid: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sid": sid }).to_string());
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln")
}

/// Backend with scripted responses and call counters.
///
/// Token responses are consumed in order; when the script runs out every
/// call fails with status 500. History and plan responses repeat.
#[derive(Default)]
pub struct ScriptedBackend {
    tokens: Mutex<VecDeque<Result<String, u16>>>,
    messages: Mutex<Option<Result<Vec<HistoryEntry>, u16>>>,
    plan: Mutex<Option<Result<Plan, u16>>>,
    token_calls: AtomicUsize,
    message_calls: AtomicUsize,
    plan_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn push_token(&self, response: Result<String, u16>) {
        self.tokens.lock().unwrap().push_back(response);
    }

    pub fn set_messages(&self, response: Result<Vec<HistoryEntry>, u16>) {
        *self.messages.lock().unwrap() = Some(response);
    }

    pub fn set_plan(&self, response: Result<Plan, u16>) {
        *self.plan.lock().unwrap() = Some(response);
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn fetch_token(
        &self,
        _user_id: Option<&str>,
        _stale_token: Option<&str>,
    ) -> Result<String, AuthError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(500))
            .map_err(AuthError::Status)
    }

    async fn fetch_messages(&self) -> Result<Vec<HistoryEntry>, FetchError> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|status| FetchError::Status {
                resource: "messages",
                status,
            })
    }

    async fn fetch_plan(&self) -> Result<Plan, FetchError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        self.plan
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Plan::default()))
            .map_err(|status| FetchError::Status {
                resource: "plan",
                status,
            })
    }
}

/// The test's end of a socket opened by [`MockConnector`].
pub struct MockPeer {
    pub url: Url,
    inbound: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: fmpsc::UnboundedReceiver<String>,
    sink_closed: Arc<AtomicBool>,
}

impl MockPeer {
    /// Whether the client closed its sink gracefully.
    pub fn sink_closed(&self) -> bool {
        self.sink_closed.load(Ordering::SeqCst)
    }

    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: &str) {
        self.inbound
            .unbounded_send(Ok(Frame::Text(text.to_string())))
            .unwrap();
    }

    /// Deliver a transport error to the client.
    pub fn push_error(&self, message: &str) {
        self.inbound
            .unbounded_send(Err(TransportError::Socket(message.to_string())))
            .unwrap();
    }

    /// Next frame the client sent, or `None` once its sink is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Drop the connection from the server side.
    pub fn close(self) {}
}

/// Client half of a mock socket; records a graceful close.
struct RecordingSink {
    inner: fmpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl Sink<String> for RecordingSink {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(item)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.closed.store(true, Ordering::SeqCst);
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Connector handing each opened socket's peer to the test.
pub struct MockConnector {
    opened: Mutex<Vec<Url>>,
    failures: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: AsyncMutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            opened: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            peers_tx,
            peers_rx: AsyncMutex::new(peers_rx),
        }
    }
}

impl MockConnector {
    /// Fail the next `count` opens.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of open attempts, failed ones included.
    pub fn open_calls(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Wait for the next successfully opened socket.
    pub async fn next_peer(&self) -> MockPeer {
        self.peers_rx.lock().await.recv().await.unwrap()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<Socket, TransportError> {
        self.opened.lock().unwrap().push(url.clone());

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (inbound_tx, inbound_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound_rx) = fmpsc::unbounded();
        let sink_closed = Arc::new(AtomicBool::new(false));
        self.peers_tx
            .send(MockPeer {
                url: url.clone(),
                inbound: inbound_tx,
                outbound: outbound_rx,
                sink_closed: Arc::clone(&sink_closed),
            })
            .unwrap();

        Ok(Socket {
            sink: Box::pin(RecordingSink {
                inner: outbound_tx,
                closed: sink_closed,
            }),
            stream: inbound_rx.boxed(),
        })
    }
}
