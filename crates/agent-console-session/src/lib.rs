//! Configuration, credentials and backend access for the agent console.
//!
//! Provides:
//! - `SessionConfig` - Layered configuration (defaults, JSON file, environment)
//! - `CredentialProvider` - Cached bearer token with on-demand refetch
//! - `HttpBackend` - reqwest client for the auth, history and plan endpoints
//! - Token storage implementations (memory, file)

pub mod config;
pub mod credentials;
pub mod http;
pub mod storage;

pub use config::{ConfigError, ReconnectPolicy, SessionConfig};
pub use credentials::CredentialProvider;
pub use http::HttpBackend;
