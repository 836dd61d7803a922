//! Storage backends by location
//!
//! Repository locations are URLs. `file:` locations map to a
//! [`FilesystemStorage`] rooted at the path; `mem:` locations map to a
//! [`MemoryStorage`] that is shared by every repository instance opened for
//! the same location, so a reconfigured repository keeps its content.

use artifact_repo_core::storage::RepositoryStorage;
use artifact_repo_core::{RepositoryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::filesystem::FilesystemStorage;
use crate::memory::MemoryStorage;

/// Opens the storage backend behind a repository location
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Whether locations with this URL can be opened locally
    fn supports(&self, location: &Url) -> bool;

    async fn open(&self, location: &Url) -> Result<Arc<dyn RepositoryStorage>>;
}

/// Provider for `file:` and `mem:` locations
#[derive(Debug, Default)]
pub struct DefaultStorageProvider {
    memory: DashMap<String, Arc<MemoryStorage>>,
}

impl DefaultStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory storage for a `mem:` location, created on first use
    pub fn memory_storage(&self, location: &Url) -> Arc<MemoryStorage> {
        let key = location.as_str().trim_end_matches('/').to_string();
        self.memory
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MemoryStorage::new(key)))
            .clone()
    }
}

#[async_trait]
impl StorageProvider for DefaultStorageProvider {
    fn supports(&self, location: &Url) -> bool {
        matches!(location.scheme(), "file" | "mem")
    }

    async fn open(&self, location: &Url) -> Result<Arc<dyn RepositoryStorage>> {
        match location.scheme() {
            "file" => {
                let path = location.to_file_path().map_err(|_| {
                    RepositoryError::Configuration(format!(
                        "'{}' is not a valid file location",
                        location
                    ))
                })?;
                debug!(path = %path.display(), "Opening filesystem storage");
                let storage = FilesystemStorage::open(path).await?;
                Ok(Arc::new(storage))
            }
            "mem" => Ok(self.memory_storage(location)),
            other => Err(RepositoryError::Configuration(format!(
                "No local storage for '{}' locations ({})",
                other, location
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_storage_shared_per_location() {
        let provider = DefaultStorageProvider::new();
        let location = Url::parse("mem:internal").unwrap();
        let first = provider.open(&location).await.unwrap();
        first
            .write("a.txt", &mut &b"x"[..], false)
            .await
            .unwrap();

        let second = provider.open(&location).await.unwrap();
        assert!(second.stat("a.txt").await.unwrap().is_some());

        let other = provider.open(&Url::parse("mem:other").unwrap()).await.unwrap();
        assert!(other.stat("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_location_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repositories/internal");
        let location = Url::from_directory_path(&root).unwrap();
        let provider = DefaultStorageProvider::new();

        let storage = provider.open(&location).await.unwrap();
        assert!(root.is_dir());
        assert!(storage.stat("").await.unwrap().unwrap().container);
    }

    #[tokio::test]
    async fn test_remote_scheme_rejected() {
        let provider = DefaultStorageProvider::new();
        let location = Url::parse("https://repo.example.com/maven2").unwrap();
        assert!(!provider.supports(&location));
        assert!(matches!(
            provider.open(&location).await,
            Err(RepositoryError::Configuration(_))
        ));
    }
}
