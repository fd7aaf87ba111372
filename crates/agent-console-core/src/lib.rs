//! Core abstractions for the agent console session layer.
//!
//! This crate provides the fundamental building blocks:
//! - `Token` - Bearer credential with an embedded session-id claim
//! - `Notifier` - Sticky, key de-duplicated status notifications
//! - `StateUpdate` / `StateSink` - Projection vocabulary for downstream state
//! - Storage and backend traits, plus the shared error taxonomy

pub mod error;
pub mod model;
pub mod notify;
pub mod state;
pub mod token;
pub mod traits;

pub use error::{
    AuthError, FetchError, ProtocolError, SessionError, StorageError, TransportError,
    ValidationError,
};
pub use model::{HistoryEntry, Plan, Role, Task, TaskState};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use state::{MemorySink, StateSink, StateUpdate};
pub use token::{Token, is_valid_token, validate_token};
pub use traits::{SessionBackend, TokenStore};
