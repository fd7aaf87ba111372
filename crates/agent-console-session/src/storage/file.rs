//! File-backed token storage.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use agent_console_core::{StorageError, TokenStore, traits::TOKEN_KEY};
use async_trait::async_trait;

/// Token slot persisted as a small JSON object (`{"token": "..."}`).
///
/// A missing file reads as an empty slot. The parent directory is created on
/// first save. Other keys already present in the file are preserved; a file
/// that does not parse is left untouched and every operation reports it.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_slots(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_slots(&self, slots: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(slots)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.read_slots().await?.remove(TOKEN_KEY))
    }

    async fn save(&self, token: &str) -> Result<(), StorageError> {
        let mut slots = self.read_slots().await?;
        slots.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_slots(&slots).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut slots = self.read_slots().await?;
        if slots.remove(TOKEN_KEY).is_some() {
            self.write_slots(&slots).await?;
        }
        Ok(())
    }
}
