//! In-memory token storage.

use std::sync::RwLock;

use agent_console_core::{StorageError, TokenStore};
use async_trait::async_trait;

/// In-memory token slot.
///
/// Useful for tests and embedders that manage persistence themselves.
/// The token is lost on restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .token
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    async fn save(&self, token: &str) -> Result<(), StorageError> {
        *self
            .token
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))? = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self
            .token
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))? = None;
        Ok(())
    }
}
