//! Object storage for uploaded document bytes.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{QuestError, Result};

/// Stores bytes under a key and hands back a locator to fetch them again.
#[async_trait]
pub trait ObjectLocator: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object, and return
    /// its locator.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes behind a locator returned by [`put`](Self::put).
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;

    /// Remove the object. Removing a missing object is not an error.
    async fn remove(&self, locator: &str) -> Result<()>;
}

/// Storage key of an uploaded document. Unique per document, so uploads
/// sharing a file name never share bytes.
pub fn document_key(topic_id: &str, document_id: &str, filename: &str) -> String {
    format!("certifications/{topic_id}/{document_id}/{filename}")
}

const FILE_SCHEME: &str = "file://";

/// Keeps objects as files below a base directory.
///
/// Locators look like `file://certifications/<topic>/<filename>` and are
/// always resolved relative to the base directory.
#[derive(Clone, Debug)]
pub struct FileSystemLocator {
    base_path: PathBuf,
}

impl FileSystemLocator {
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    fn sub_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(QuestError::Locator(format!("invalid object key '{key}'")));
        }
        Ok(self.base_path.join(relative))
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let key = locator
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| QuestError::Locator(format!("not a file locator: '{locator}'")))?;
        self.sub_path(key)
    }
}

#[async_trait]
impl ObjectLocator for FileSystemLocator {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.sub_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| QuestError::Locator(format!("create {}: {e}", parent.display())))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| QuestError::Locator(format!("write {}: {e}", path.display())))?;
        debug!(?path, size = bytes.len(), "stored object");
        Ok(format!("{FILE_SCHEME}{key}"))
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        trace!(?path, "loading object");
        fs::read(&path).await.map_err(|e| QuestError::Locator(format!("read {}: {e}", path.display())))
    }

    async fn remove(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuestError::Locator(format!("remove {}: {e}", path.display()))),
        }
    }
}

const MEMORY_SCHEME: &str = "memory://";

/// Keeps objects in a map. For tests and single-process demos.
#[derive(Debug, Default)]
pub struct InMemoryLocator {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectLocator for InMemoryLocator {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        self.objects.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(format!("{MEMORY_SCHEME}{key}"))
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let key = locator.strip_prefix(MEMORY_SCHEME).unwrap_or(locator);
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| QuestError::Locator(format!("no object at '{locator}'")))
    }

    async fn remove(&self, locator: &str) -> Result<()> {
        let key = locator.strip_prefix(MEMORY_SCHEME).unwrap_or(locator);
        self.objects.write().await.remove(key);
        Ok(())
    }
}
