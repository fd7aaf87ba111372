//! reqwest client for the backend HTTP endpoints.

use std::sync::Arc;

use agent_console_core::{
    AuthError, FetchError, HistoryEntry, Plan, SessionBackend, TokenStore,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use crate::config::{ConfigError, SessionConfig, endpoint};

const AUTH_PATH: &str = "api/auth";
const MESSAGES_PATH: &str = "api/messages";
const MESSAGES_TOTAL_PATH: &str = "api/messages/total";
const PLAN_PATH: &str = "api/plan";

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<HistoryEntry>,
}

#[derive(Deserialize)]
struct MessageTotalResponse {
    msg_total: u64,
}

/// Backend client.
///
/// Every request except the token fetch authenticates with the token
/// currently held in `store`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
}

impl HttpBackend {
    /// Create a client for `config.backend_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &SessionConfig, store: Arc<dyn TokenStore>) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            store,
        })
    }

    /// Number of messages recorded for the session.
    ///
    /// # Errors
    /// Returns error on transport failure, non-200 status or undecodable body.
    pub async fn message_count(&self) -> Result<u64, FetchError> {
        const RESOURCE: &str = "message total";
        let request = self.client.get(endpoint(&self.base_url, MESSAGES_TOTAL_PATH));
        let response = self.send_authorized(RESOURCE, request).await?;
        let body: MessageTotalResponse = decode(RESOURCE, response).await?;
        Ok(body.msg_total)
    }

    /// Drop the server-side session history.
    ///
    /// # Errors
    /// Returns error on transport failure or non-200 status.
    pub async fn clear_messages(&self) -> Result<(), FetchError> {
        let request = self.client.delete(endpoint(&self.base_url, MESSAGES_PATH));
        self.send_authorized("messages", request).await?;
        Ok(())
    }

    async fn bearer(&self) -> Option<String> {
        match self.store.load().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed to read cached token: {e}");
                None
            }
        }
    }

    async fn send_authorized(
        &self,
        resource: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, FetchError> {
        let request = match self.bearer().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| FetchError::Request {
            resource,
            message: e.to_string(),
        })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                resource,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(
    resource: &'static str,
    response: Response,
) -> Result<T, FetchError> {
    response.json().await.map_err(|e| FetchError::Decode {
        resource,
        message: e.to_string(),
    })
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn fetch_token(
        &self,
        user_id: Option<&str>,
        stale_token: Option<&str>,
    ) -> Result<String, AuthError> {
        let mut url = endpoint(&self.base_url, AUTH_PATH);
        if let Some(uid) = user_id {
            url.query_pairs_mut().append_pair("uid", uid);
        }

        let mut request = self.client.get(url);
        if let Some(stale) = stale_token {
            request = request.bearer_auth(stale);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(AuthError::Status(response.status().as_u16()));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        body.token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::EmptyToken)
    }

    async fn fetch_messages(&self) -> Result<Vec<HistoryEntry>, FetchError> {
        const RESOURCE: &str = "messages";
        let request = self.client.get(endpoint(&self.base_url, MESSAGES_PATH));
        let response = self.send_authorized(RESOURCE, request).await?;
        let body: MessagesResponse = decode(RESOURCE, response).await?;
        Ok(body.messages)
    }

    async fn fetch_plan(&self) -> Result<Plan, FetchError> {
        const RESOURCE: &str = "plan";
        let request = self.client.get(endpoint(&self.base_url, PLAN_PATH));
        let response = self.send_authorized(RESOURCE, request).await?;
        decode(RESOURCE, response).await
    }
}

#[cfg(test)]
mod tests {
    use agent_console_core::{Role, TaskState};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;
    use crate::storage::MemoryTokenStore;

    fn backend(server: &MockServer, store: MemoryTokenStore) -> HttpBackend {
        let config = SessionConfig::for_backend(&server.uri()).unwrap();
        HttpBackend::new(&config, Arc::new(store)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_token_sends_uid_and_stale_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth"))
            .and(query_param("uid", "user-7"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, MemoryTokenStore::new());
        let token = backend.fetch_token(Some("user-7"), Some("stale")).await.unwrap();
        assert_eq!(token, "fresh");
    }

    #[tokio::test]
    async fn test_fetch_token_non_200_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": "x"})))
            .mount(&server)
            .await;

        let result = backend(&server, MemoryTokenStore::new())
            .fetch_token(None, None)
            .await;
        assert!(matches!(result, Err(AuthError::Status(201))));
    }

    #[tokio::test]
    async fn test_fetch_token_empty_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": ""})))
            .mount(&server)
            .await;

        let result = backend(&server, MemoryTokenStore::new())
            .fetch_token(None, None)
            .await;
        assert!(matches!(result, Err(AuthError::EmptyToken)));
    }

    #[tokio::test]
    async fn test_fetch_messages_uses_cached_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages"))
            .and(header("authorization", "Bearer cached"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    {"role": "user", "payload": {"action": "message", "args": {"content": "hi"}}},
                    {"role": "assistant", "payload": {"action": "message", "args": {"content": "hello"}}}
                ]
            })))
            .mount(&server)
            .await;

        let messages = backend(&server, MemoryTokenStore::with_token("cached"))
            .fetch_messages()
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_fetch_plan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mainGoal": "X",
                "task": {"state": "open"}
            })))
            .mount(&server)
            .await;

        let plan = backend(&server, MemoryTokenStore::new())
            .fetch_plan()
            .await
            .unwrap();
        assert_eq!(plan.main_goal.as_deref(), Some("X"));
        assert_eq!(plan.task.state, TaskState::Open);
    }

    #[tokio::test]
    async fn test_fetch_plan_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plan"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = backend(&server, MemoryTokenStore::new())
            .fetch_plan()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { resource: "plan", status: 500 }));
    }

    #[tokio::test]
    async fn test_message_count_and_clear() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/total"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg_total": 12})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "true"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, MemoryTokenStore::with_token("cached"));
        assert_eq!(backend.message_count().await.unwrap(), 12);
        backend.clear_messages().await.unwrap();
    }
}
