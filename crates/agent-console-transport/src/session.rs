//! The session-context object.

use std::sync::Arc;

use agent_console_core::{MemorySink, Notifier, SessionBackend, StateSink, TokenStore};
use agent_console_session::{
    ConfigError, CredentialProvider, HttpBackend, SessionConfig, storage::FileTokenStore,
};
use thiserror::Error;

use crate::{
    bootstrap::SessionBootstrap,
    connection::ConnectionManager,
    connector::Connector,
    dispatcher::Dispatcher,
};

/// Session assembly failure.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No connector configured and the websocket feature is disabled")]
    MissingConnector,
}

/// One console session: credentials, connection, dispatch and replay,
/// sharing a single notifier and state sink.
pub struct ConsoleSession {
    config: SessionConfig,
    manager: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    bootstrap: Arc<SessionBootstrap>,
    notifier: Arc<Notifier>,
    backend: Arc<dyn SessionBackend>,
}

impl ConsoleSession {
    #[must_use]
    pub fn builder(config: SessionConfig) -> ConsoleSessionBuilder {
        ConsoleSessionBuilder::new(config)
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub const fn bootstrap(&self) -> &Arc<SessionBootstrap> {
        &self.bootstrap
    }

    #[must_use]
    pub const fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    #[must_use]
    pub const fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    /// Close the connection. No reconnect follows.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down console session");
        self.manager.close();
    }
}

/// Builder for [`ConsoleSession`].
///
/// Unset parts default from the config: a file token store at
/// `config.token_file()`, an [`HttpBackend`] for `config.backend_url`, a
/// [`MemorySink`], and the WebSocket connector.
pub struct ConsoleSessionBuilder {
    config: SessionConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    backend: Option<Arc<dyn SessionBackend>>,
    sink: Option<Arc<dyn StateSink>>,
    connector: Option<Arc<dyn Connector>>,
    notifier: Option<Arc<Notifier>>,
}

impl ConsoleSessionBuilder {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            token_store: None,
            backend: None,
            sink: None,
            connector: None,
            notifier: None,
        }
    }

    #[must_use]
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Assemble the session. Nothing connects until `connect` or `send`.
    ///
    /// # Errors
    /// Returns error if the default HTTP backend cannot be built, or if no
    /// connector is available.
    pub fn build(self) -> Result<ConsoleSession, BuildError> {
        let store = self
            .token_store
            .unwrap_or_else(|| Arc::new(FileTokenStore::new(self.config.token_file())));
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(&self.config, Arc::clone(&store))?),
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(MemorySink::new()));
        let notifier = self.notifier.unwrap_or_default();
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector()?,
        };

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&sink), Arc::clone(&backend)));
        let credentials = Arc::new(CredentialProvider::new(store, Arc::clone(&backend)));
        let manager = ConnectionManager::new(
            &self.config,
            credentials,
            connector,
            Arc::clone(&dispatcher),
            Arc::clone(&notifier),
        );
        let bootstrap = Arc::new(SessionBootstrap::new(
            Arc::clone(&backend),
            Arc::clone(&dispatcher),
            sink,
            Arc::clone(&notifier),
        ));

        tracing::debug!(backend_url = %self.config.backend_url, "Console session assembled");
        Ok(ConsoleSession {
            config: self.config,
            manager,
            dispatcher,
            bootstrap,
            notifier,
            backend,
        })
    }
}

#[cfg(feature = "websocket")]
fn default_connector() -> Result<Arc<dyn Connector>, BuildError> {
    Ok(Arc::new(crate::websocket::TungsteniteConnector::new()))
}

#[cfg(not(feature = "websocket"))]
fn default_connector() -> Result<Arc<dyn Connector>, BuildError> {
    Err(BuildError::MissingConnector)
}
