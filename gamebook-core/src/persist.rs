//! Save slot persistence.
//!
//! A save is one JSON document holding the player state, the current node
//! and the current language. It is written under a single key of a
//! [`KeyValueStore`]; saving overwrites the slot and loading replaces the
//! whole session state.

use crate::state::PlayerState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Default key of the save slot.
pub const SAVE_KEY: &str = "gameSave";

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),
}

/// A string key-value store such as browser local storage or a directory.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// The value under `key`, or `None` if nothing was stored.
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<(), PersistError>;
}

/// In-memory store. Values last as long as the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PersistError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store keeping each key in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`. Characters that are not safe in a
    /// file name are replaced with `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(key), value).await?;
        Ok(())
    }
}

/// What a save slot holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub state: PlayerState,
    pub current_node: String,
    pub current_lang: String,
}

impl SaveRecord {
    pub fn new(
        state: PlayerState,
        current_node: impl Into<String>,
        current_lang: impl Into<String>,
    ) -> Self {
        Self {
            state,
            current_node: current_node.into(),
            current_lang: current_lang.into(),
        }
    }
}

/// A single save slot in a key-value store.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl Persistence {
    /// A slot under [`SAVE_KEY`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, SAVE_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the record, overwriting the slot.
    pub async fn save(&self, record: &SaveRecord) -> Result<(), PersistError> {
        let json = serde_json::to_string(record)?;
        self.store.set(&self.key, json).await?;
        tracing::info!(key = %self.key, node = %record.current_node, "Game saved");
        Ok(())
    }

    /// Read the record, or `None` if the slot is empty.
    pub async fn load(&self) -> Result<Option<SaveRecord>, PersistError> {
        let Some(json) = self.store.get(&self.key).await? else {
            tracing::debug!(key = %self.key, "No save found");
            return Ok(None);
        };

        let record: SaveRecord = serde_json::from_str(&json)?;
        tracing::info!(key = %self.key, node = %record.current_node, "Game loaded");
        Ok(Some(record))
    }

    pub async fn has_save(&self) -> Result<bool, PersistError> {
        Ok(self.store.get(&self.key).await?.is_some())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").field("key", &self.key).finish()
    }
}
