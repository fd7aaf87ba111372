//! Socket opening abstraction.

use std::pin::Pin;

use agent_console_core::TransportError;
use async_trait::async_trait;
use futures::{Sink, stream::BoxStream};
use url::Url;

/// Inbound frame, after control frames are filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Peer sent a close frame.
    Close,
}

/// Outbound half of an open socket.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open socket.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// An open socket, split into halves.
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Trait for opening the transport.
///
/// Implement this to swap the socket implementation (e.g. in tests).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`. Resolves once the socket is open.
    async fn open(&self, url: &Url) -> Result<Socket, TransportError>;
}
