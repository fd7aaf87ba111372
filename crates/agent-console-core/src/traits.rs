//! Core traits for token storage and backend access.

use async_trait::async_trait;

use crate::{
    HistoryEntry, Plan,
    error::{AuthError, FetchError, StorageError},
};

/// Well-known key of the token slot.
pub const TOKEN_KEY: &str = "token";

/// Trait for the persistent token slot.
///
/// A store holds at most one token, the process-wide cached credential.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the cached token, if any.
    async fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the cached token.
    async fn save(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the cached token.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Trait for the backend HTTP surface used by the session layer.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch a fresh token.
    ///
    /// # Arguments
    /// * `user_id` - Optional user identifier, sent as the `uid` query parameter
    /// * `stale_token` - Previously cached token, sent as the bearer credential
    async fn fetch_token(
        &self,
        user_id: Option<&str>,
        stale_token: Option<&str>,
    ) -> Result<String, AuthError>;

    /// Fetch the ordered session history.
    async fn fetch_messages(&self) -> Result<Vec<HistoryEntry>, FetchError>;

    /// Fetch the current task-plan snapshot.
    async fn fetch_plan(&self) -> Result<Plan, FetchError>;
}
