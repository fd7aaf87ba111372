//! Layered session configuration.
//!
//! Settings are resolved in three layers (in priority order):
//! 1. Compiled defaults - [`SessionConfig::defaults()`]
//! 2. Optional JSON file - fields present in the file override defaults
//! 3. Environment variables - `AGENT_CONSOLE_*` overrides (highest priority)

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

/// Backend base URL.
pub const ENV_BACKEND_URL: &str = "AGENT_CONSOLE_BACKEND_URL";
/// Socket base URL.
pub const ENV_WS_URL: &str = "AGENT_CONSOLE_WS_URL";
/// Token file path.
pub const ENV_TOKEN_PATH: &str = "AGENT_CONSOLE_TOKEN_PATH";

/// Backend used when nothing else is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid URL in {field}: {message}")]
    InvalidUrl { field: &'static str, message: String },
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Fixed reconnect delays. There is no retry cap and no backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay after an open connection drops.
    pub after_drop_ms: u64,
    /// Delay after an attempt that never reached the open state.
    pub after_failure_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            after_drop_ms: 3_000,
            after_failure_ms: 1_500,
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn after_drop(&self) -> Duration {
        Duration::from_millis(self.after_drop_ms)
    }

    #[must_use]
    pub const fn after_failure(&self) -> Duration {
        Duration::from_millis(self.after_failure_ms)
    }
}

/// Session-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    /// Base URL of the backend HTTP API.
    pub backend_url: Url,
    /// Base URL of the socket endpoint. Derived from `backend_url` when unset.
    pub websocket_url: Option<Url>,
    /// Token file. Defaults to the platform data directory.
    pub token_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    /// Delay before a send issued mid-connect is retried.
    pub send_retry_delay_ms: u64,
}

/// Config file contents. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend_url: Option<Url>,
    websocket_url: Option<Url>,
    token_path: Option<PathBuf>,
    request_timeout_ms: Option<u64>,
    reconnect: Option<ReconnectPolicy>,
    send_retry_delay_ms: Option<u64>,
}

impl SessionConfig {
    /// Compiled defaults, pointing at [`DEFAULT_BACKEND_URL`].
    ///
    /// # Errors
    /// Never fails in practice; the URL is still parsed at runtime.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::for_backend(DEFAULT_BACKEND_URL)
    }

    /// Config pointing at `backend_url`, everything else defaulted.
    ///
    /// # Errors
    /// Returns error if the URL does not parse.
    pub fn for_backend(backend_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend_url: parse_url("backend_url", backend_url)?,
            websocket_url: None,
            token_path: None,
            request_timeout_ms: 10_000,
            reconnect: ReconnectPolicy::default(),
            send_retry_delay_ms: 1_000,
        })
    }

    /// Load defaults, then `path` if given and present, then the environment.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed, or an
    /// environment override is not a valid URL.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::defaults()?,
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::defaults()?;
        if let Some(url) = file.backend_url {
            config.backend_url = url;
        }
        config.websocket_url = file.websocket_url.or(config.websocket_url);
        config.token_path = file.token_path.or(config.token_path);
        config.request_timeout_ms = file.request_timeout_ms.unwrap_or(config.request_timeout_ms);
        config.reconnect = file.reconnect.unwrap_or(config.reconnect);
        config.send_retry_delay_ms = file
            .send_retry_delay_ms
            .unwrap_or(config.send_retry_delay_ms);
        Ok(config)
    }

    /// Apply `AGENT_CONSOLE_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    /// Returns error if a URL override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = lookup(ENV_BACKEND_URL) {
            self.backend_url = parse_url("backend_url", &raw)?;
        }
        if let Some(raw) = lookup(ENV_WS_URL) {
            self.websocket_url = Some(parse_url("websocket_url", &raw)?);
        }
        if let Some(raw) = lookup(ENV_TOKEN_PATH) {
            self.token_path = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    /// Socket base URL, explicit or derived (`http` to `ws`, `https` to `wss`).
    #[must_use]
    pub fn websocket_base(&self) -> Url {
        if let Some(url) = &self.websocket_url {
            return url.clone();
        }
        let mut url = self.backend_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always an allowed scheme change.
        let _ = url.set_scheme(scheme);
        url
    }

    /// Token file, explicit or `<data dir>/agent-console/token.json`.
    #[must_use]
    pub fn token_file(&self) -> PathBuf {
        self.token_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agent-console")
                .join("token.json")
        })
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn send_retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }
}

/// Resolve `path` (e.g. `api/auth`) under `base`, keeping any base path prefix.
#[must_use]
pub fn endpoint(base: &Url, path: &str) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path).unwrap_or(base)
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::defaults().unwrap();
        assert_eq!(config.backend_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.reconnect.after_drop(), Duration::from_secs(3));
        assert_eq!(config.reconnect.after_failure(), Duration::from_millis(1500));
        assert_eq!(config.send_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_websocket_base_derivation() {
        let config = SessionConfig::for_backend("https://agent.example.com").unwrap();
        assert_eq!(config.websocket_base().as_str(), "wss://agent.example.com/");

        let config = SessionConfig::for_backend("http://127.0.0.1:3000").unwrap();
        assert_eq!(config.websocket_base().as_str(), "ws://127.0.0.1:3000/");
    }

    #[test]
    fn test_explicit_websocket_url_wins() {
        let mut config = SessionConfig::defaults().unwrap();
        config.websocket_url = Some(Url::parse("wss://sockets.example.com").unwrap());
        assert_eq!(config.websocket_base().host_str(), Some("sockets.example.com"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND_URL, "https://backend.example.com"),
            (ENV_WS_URL, ""),
            (ENV_TOKEN_PATH, "/tmp/agent-token.json"),
        ]);

        let mut config = SessionConfig::defaults().unwrap();
        config
            .apply_env(|name| env.get(name).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.backend_url.host_str(), Some("backend.example.com"));
        assert_eq!(config.websocket_url, None);
        assert_eq!(config.token_file(), PathBuf::from("/tmp/agent-token.json"));
    }

    #[test]
    fn test_env_invalid_url() {
        let mut config = SessionConfig::defaults().unwrap();
        let result = config.apply_env(|name| (name == ENV_BACKEND_URL).then(|| "::nope".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { field: "backend_url", .. })));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.json");
        std::fs::write(
            &path,
            r#"{"backend_url":"http://10.0.0.2:8080","reconnect":{"after_drop_ms":500}}"#,
        )
        .unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.backend_url.port(), Some(8080));
        assert_eq!(config.reconnect.after_drop_ms, 500);
        assert_eq!(config.reconnect.after_failure_ms, 1_500);
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.backend_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.send_retry_delay_ms, 1_000);
    }

    #[test]
    fn test_file_with_invalid_url_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.json");
        std::fs::write(&path, r#"{"backend_url":"::nope"}"#).unwrap();

        let result = SessionConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_endpoint_keeps_prefix() {
        let base = Url::parse("https://host.example.com/console").unwrap();
        assert_eq!(
            endpoint(&base, "api/auth").as_str(),
            "https://host.example.com/console/api/auth"
        );

        let root = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(endpoint(&root, "ws").as_str(), "http://localhost:3000/ws");
    }
}
