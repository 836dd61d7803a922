//! Content view of remote repositories
//!
//! Remote content maps coordinates to paths below the remote URL. When the
//! remote location is itself locally reachable (`file:` or `mem:`), the
//! storage is opened so proxy fetches can copy from it directly.

use artifact_repo_core::{
    ItemSelector, Repository, RepositoryError, RepositoryId, RepositoryLayout, RepositoryStorage,
    Result, StorageAsset,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Timeout used when the repository carries no remote settings
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RemoteRepositoryContent {
    id: RepositoryId,
    layout: Arc<dyn RepositoryLayout>,
    url: Url,
    storage: Option<Arc<dyn RepositoryStorage>>,
    repository: RwLock<Option<Arc<Repository>>>,
}

impl std::fmt::Debug for RemoteRepositoryContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRepositoryContent")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("local", &self.storage.is_some())
            .finish()
    }
}

impl RemoteRepositoryContent {
    pub fn new(
        repository: Arc<Repository>,
        layout: Arc<dyn RepositoryLayout>,
        storage: Option<Arc<dyn RepositoryStorage>>,
    ) -> Self {
        Self {
            id: repository.id().clone(),
            url: repository.location().clone(),
            layout,
            storage,
            repository: RwLock::new(Some(repository)),
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn layout(&self) -> &Arc<dyn RepositoryLayout> {
        &self.layout
    }

    pub fn repository(&self) -> Option<Arc<Repository>> {
        self.repository.read().clone()
    }

    pub fn set_repository(&self, repository: Option<Arc<Repository>>) {
        *self.repository.write() = repository;
    }

    /// Transport timeout for fetches from this remote
    pub fn timeout(&self) -> Duration {
        self.repository()
            .and_then(|r| r.remote_settings().map(|s| s.timeout))
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn to_path(&self, selector: &ItemSelector) -> Result<String> {
        self.layout.to_path(selector)
    }

    pub fn to_item_selector(&self, path: &str) -> Result<ItemSelector> {
        self.layout.to_item_selector(path)
    }

    /// Absolute URL of a repository path
    pub fn remote_url(&self, path: &str) -> Result<Url> {
        let path = artifact_repo_core::storage::normalize_path(path)?;
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(&path)?)
    }

    /// Whether fetches can be served from local storage
    pub fn is_local(&self) -> bool {
        self.storage.is_some()
    }

    /// Asset for a path when the remote is locally reachable
    pub fn local_asset(&self, path: &str) -> Result<Option<StorageAsset>> {
        match &self.storage {
            Some(storage) => Ok(Some(StorageAsset::new(storage.clone(), path)?)),
            None => Ok(None),
        }
    }

    /// Fail unless the remote is locally reachable
    pub fn require_local(&self) -> Result<&Arc<dyn RepositoryStorage>> {
        self.storage.as_ref().ok_or_else(|| {
            RepositoryError::Configuration(format!(
                "Remote repository '{}' at {} has no local transport",
                self.id, self.url
            ))
        })
    }
}
