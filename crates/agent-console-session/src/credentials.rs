//! Bearer token acquisition.

use std::sync::Arc;

use agent_console_core::{
    AuthError, SessionBackend, Token, TokenStore, is_valid_token, validate_token,
};

/// Hands out a valid token, fetching a new one only when the cached one is
/// absent or invalid.
///
/// Tokens are never refreshed ahead of expiry; a token is replaced only once
/// it stops validating.
pub struct CredentialProvider {
    store: Arc<dyn TokenStore>,
    backend: Arc<dyn SessionBackend>,
}

impl CredentialProvider {
    /// Create a provider over `store`, fetching from `backend`.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, backend: Arc<dyn SessionBackend>) -> Self {
        Self { store, backend }
    }

    /// Get a valid token.
    ///
    /// Makes at most one backend request per call.
    ///
    /// # Errors
    /// Returns `AuthError` if the fetch fails or yields no token, and
    /// `AuthError::Invalid` carrying the `ValidationError` if a freshly
    /// fetched token does not validate. That case is fatal for this call.
    pub async fn get_token(&self, user_id: Option<&str>) -> Result<Token, AuthError> {
        let cached = match self.store.load().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("Token cache unreadable, treating as empty: {e}");
                None
            }
        };

        if let Some(token) = cached.as_deref().filter(|t| is_valid_token(t)) {
            return Ok(Token::new(token));
        }

        tracing::debug!(user_id, "Cached token missing or invalid, fetching a new one");
        let fresh = self
            .backend
            .fetch_token(user_id, cached.as_deref().filter(|t| !t.is_empty()))
            .await?;

        if fresh.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        validate_token(&fresh)?;

        if let Err(e) = self.store.save(&fresh).await {
            tracing::warn!("Failed to cache token: {e}");
        }
        Ok(Token::new(fresh))
    }
}
