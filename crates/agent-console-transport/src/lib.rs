//! Socket connection, message dispatch and session replay.
//!
//! Provides:
//! - Wire protocol (action / observation frames)
//! - `Dispatcher` - Routes inbound frames to state projections
//! - `ConnectionManager` - Connect / authenticate / retry state machine
//! - `SessionBootstrap` - History and plan replay on (re)connection
//! - `ConsoleSession` - The session-context object tying it together
//! - WebSocket connector (feature: websocket)

pub mod agent;
pub mod bootstrap;
pub mod connection;
pub mod connector;
pub mod dispatcher;
pub mod listeners;
pub mod protocol;
pub mod session;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use agent::{AgentSettings, InitError, initialize_agent};
pub use bootstrap::{ReplayReport, SessionBootstrap};
pub use connection::{CONNECTION_NOTICE_KEY, ConnectionManager, ConnectionState};
pub use connector::{Connector, Frame, Socket};
pub use dispatcher::{Dispatcher, Route};
pub use listeners::{ConnectionEvent, EventKind, ListenerId, ListenerRegistry};
pub use protocol::{ActionKind, ActionMessage, ClientAction, InboundMessage};
pub use session::{BuildError, ConsoleSession, ConsoleSessionBuilder};
