//! Key-value persistence for the conversation log and settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use crate::error::PersistenceError;

/// Key holding the serialized conversation log.
pub const MESSAGES_KEY: &str = "chatMessages";
/// Key holding the serialized settings.
pub const SETTINGS_KEY: &str = "appSettings";

/// Durable key-value storage of serialized blobs.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    /// Removing a key that does not exist succeeds.
    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;

    async fn remove_many(&self, keys: &[&str]) -> Result<(), PersistenceError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
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

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn io_error(key: &str, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(key, e))?;

        // Write to a sibling temp file first so a crash never leaves a torn blob
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).await.map_err(|e| io_error(key, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_error(key, e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

/// In-process store, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("memory store is failing".to_string()));
        }
        Ok(())
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
        self.entries
            .lock()
            .map_err(|e| PersistenceError::Unavailable(format!("store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.check()?;
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.check()?;
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.check()?;
        self.entries()?.remove(key);
        Ok(())
    }
}
