//! Storage backends for [`SavingSystem`](crate::SavingSystem).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Key/value storage for serialized documents.
#[async_trait]
pub trait SaveStore: Send + Sync {
    /// Returns `None` when nothing is stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn write(&self, key: &str, contents: &str) -> Result<()>;

    /// Returns whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait]
impl<S: SaveStore + ?Sized> SaveStore for Arc<S> {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, contents: &str) -> Result<()> {
        (**self).write(key, contents).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }
}

// ---------------------------------------------------------------------------
// FileSaveStore
// ---------------------------------------------------------------------------

/// One `<key>.json` file per document inside a directory.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl SaveStore for FileSaveStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, key: &str, contents: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create save directory {}", self.dir.display()))?;
        let path = self.path_for(key);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySaveStore (tests)
// ---------------------------------------------------------------------------

/// In-memory store for tests. Thread-safe.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing serialization.
    pub fn insert(&self, key: impl Into<String>, contents: impl Into<String>) {
        self.lock().insert(key.into(), contents.into());
    }

    /// Raw stored contents (for test assertions).
    pub fn contents(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SaveStore for MemorySaveStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.contents(key))
    }

    async fn write(&self, key: &str, contents: &str) -> Result<()> {
        self.insert(key, contents);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_creates_its_directory_on_write() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSaveStore::new(root.path().join("nested").join("saves"));

        assert_eq!(store.read("Profile").await.unwrap(), None);
        store.write("Profile", "{}").await.unwrap();

        assert!(store.path_for("Profile").ends_with("saves/Profile.json"));
        assert_eq!(store.read("Profile").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn deleting_a_missing_file_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSaveStore::new(root.path());

        assert!(!store.delete("Profile").await.unwrap());
        store.write("Profile", "{}").await.unwrap();
        assert!(store.delete("Profile").await.unwrap());
        assert!(!store.path_for("Profile").exists());
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemorySaveStore::new();
        store.write("a", "1").await.unwrap();
        assert_eq!(store.read("a").await.unwrap().as_deref(), Some("1"));
        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.read("a").await.unwrap(), None);
    }
}
