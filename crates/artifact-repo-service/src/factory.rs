//! Content factory
//!
//! Content objects are created by the provider that supports a repository's
//! type and layout, and cached per repository id. The cache is keyed on the
//! repository instance: when a repository is reconfigured (a new instance),
//! the old content is detached and replaced.

use artifact_repo_core::{
    layout_for, Repository, RepositoryError, RepositoryType, Result,
};
use artifact_repo_storage::StorageProvider;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::audit::AuditDispatcher;
use crate::content::ManagedRepositoryContent;
use crate::remote::RemoteRepositoryContent;

/// Creates content objects for the repository types and layouts it supports
#[async_trait]
pub trait RepositoryContentProvider: Send + Sync {
    fn supports(&self, repository_type: RepositoryType, layout: &str) -> bool;

    async fn create_managed_content(
        &self,
        repository: Arc<Repository>,
    ) -> Result<ManagedRepositoryContent>;

    async fn create_remote_content(
        &self,
        repository: Arc<Repository>,
    ) -> Result<RemoteRepositoryContent>;
}

/// Content provider for Maven repositories in the built-in layouts
pub struct MavenContentProvider {
    storage: Arc<dyn StorageProvider>,
    audit: Arc<AuditDispatcher>,
}

impl MavenContentProvider {
    pub fn new(storage: Arc<dyn StorageProvider>, audit: Arc<AuditDispatcher>) -> Self {
        Self { storage, audit }
    }
}

#[async_trait]
impl RepositoryContentProvider for MavenContentProvider {
    fn supports(&self, repository_type: RepositoryType, layout: &str) -> bool {
        repository_type == RepositoryType::Maven && layout_for(layout).is_some()
    }

    async fn create_managed_content(
        &self,
        repository: Arc<Repository>,
    ) -> Result<ManagedRepositoryContent> {
        let layout = layout_for(repository.layout()).ok_or_else(|| unsupported(&repository))?;
        let storage = self.storage.open(repository.location()).await?;
        Ok(ManagedRepositoryContent::new(
            repository,
            layout,
            storage,
            self.audit.clone(),
        ))
    }

    async fn create_remote_content(
        &self,
        repository: Arc<Repository>,
    ) -> Result<RemoteRepositoryContent> {
        let layout = layout_for(repository.layout()).ok_or_else(|| unsupported(&repository))?;
        let storage = if self.storage.supports(repository.location()) {
            Some(self.storage.open(repository.location()).await?)
        } else {
            None
        };
        Ok(RemoteRepositoryContent::new(repository, layout, storage))
    }
}

fn unsupported(repository: &Repository) -> RepositoryError {
    RepositoryError::UnsupportedRepositoryType(format!(
        "{} repositories with layout '{}' ({})",
        repository.repository_type(),
        repository.layout(),
        repository.id()
    ))
}

type ManagedEntry = (Arc<Repository>, Arc<ManagedRepositoryContent>);
type RemoteEntry = (Arc<Repository>, Arc<RemoteRepositoryContent>);

/// Cache of content objects in front of the content providers
pub struct RepositoryContentFactory {
    providers: Vec<Arc<dyn RepositoryContentProvider>>,
    managed: DashMap<String, ManagedEntry>,
    remote: DashMap<String, RemoteEntry>,
}

impl RepositoryContentFactory {
    pub fn new(providers: Vec<Arc<dyn RepositoryContentProvider>>) -> Self {
        Self {
            providers,
            managed: DashMap::new(),
            remote: DashMap::new(),
        }
    }

    pub fn supports(&self, repository_type: RepositoryType, layout: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p.supports(repository_type, layout))
    }

    fn provider_for(&self, repository: &Repository) -> Result<&Arc<dyn RepositoryContentProvider>> {
        self.providers
            .iter()
            .find(|p| p.supports(repository.repository_type(), repository.layout()))
            .ok_or_else(|| unsupported(repository))
    }

    /// Content for a managed repository instance, created on first use
    #[instrument(skip(self, repository), fields(repository = %repository.id()))]
    pub async fn get_managed_content(
        &self,
        repository: &Arc<Repository>,
    ) -> Result<Arc<ManagedRepositoryContent>> {
        let id = repository.id().as_str();
        if let Some(entry) = self.managed.get(id) {
            if Arc::ptr_eq(&entry.0, repository) {
                return Ok(entry.1.clone());
            }
        }

        let provider = self.provider_for(repository)?;
        let content = Arc::new(provider.create_managed_content(repository.clone()).await?);
        match self.managed.entry(id.to_string()) {
            Entry::Occupied(existing) if Arc::ptr_eq(&existing.get().0, repository) => {
                // Created concurrently for the same instance
                Ok(existing.get().1.clone())
            }
            Entry::Occupied(mut existing) => {
                let (_, old) = existing.insert((repository.clone(), content.clone()));
                old.detach();
                debug!("Replaced content of reconfigured repository");
                Ok(content)
            }
            Entry::Vacant(vacant) => {
                vacant.insert((repository.clone(), content.clone()));
                Ok(content)
            }
        }
    }

    /// Content for a remote repository instance, created on first use
    #[instrument(skip(self, repository), fields(repository = %repository.id()))]
    pub async fn get_remote_content(
        &self,
        repository: &Arc<Repository>,
    ) -> Result<Arc<RemoteRepositoryContent>> {
        let id = repository.id().as_str();
        if let Some(entry) = self.remote.get(id) {
            if Arc::ptr_eq(&entry.0, repository) {
                return Ok(entry.1.clone());
            }
        }

        let provider = self.provider_for(repository)?;
        let content = Arc::new(provider.create_remote_content(repository.clone()).await?);
        match self.remote.entry(id.to_string()) {
            Entry::Occupied(existing) if Arc::ptr_eq(&existing.get().0, repository) => {
                Ok(existing.get().1.clone())
            }
            Entry::Occupied(mut existing) => {
                let (_, old) = existing.insert((repository.clone(), content.clone()));
                old.set_repository(None);
                Ok(content)
            }
            Entry::Vacant(vacant) => {
                vacant.insert((repository.clone(), content.clone()));
                Ok(content)
            }
        }
    }

    /// Cached managed content, without creating it
    pub fn cached_managed_content(&self, id: &str) -> Option<Arc<ManagedRepositoryContent>> {
        self.managed.get(id).map(|entry| entry.1.clone())
    }

    /// Forget the content of `id`, detaching it from its repository
    pub fn evict(&self, id: &str) {
        if let Some((_, (_, content))) = self.managed.remove(id) {
            content.detach();
        }
        if let Some((_, (_, content))) = self.remote.remove(id) {
            content.set_repository(None);
        }
    }

    /// Forget and detach all content
    pub fn clear(&self) {
        for entry in self.managed.iter() {
            entry.1.detach();
        }
        for entry in self.remote.iter() {
            entry.1.set_repository(None);
        }
        self.managed.clear();
        self.remote.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::repository;
    use artifact_repo_storage::DefaultStorageProvider;

    fn factory() -> RepositoryContentFactory {
        let provider = MavenContentProvider::new(
            Arc::new(DefaultStorageProvider::new()),
            Arc::new(AuditDispatcher::new()),
        );
        RepositoryContentFactory::new(vec![Arc::new(provider)])
    }

    #[tokio::test]
    async fn test_content_cached_per_instance() {
        let factory = factory();
        let first = repository("internal", "default", true, true);
        let a = factory.get_managed_content(&first).await.unwrap();
        let b = factory.get_managed_content(&first).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let second = repository("internal", "default", false, true);
        let c = factory.get_managed_content(&second).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(!a.is_attached());
        assert!(c.is_attached());
    }

    #[tokio::test]
    async fn test_unsupported_layout() {
        let factory = factory();
        assert!(factory.supports(RepositoryType::Maven, "legacy"));
        assert!(!factory.supports(RepositoryType::Maven, "p2"));
        let repository = repository("odd", "p2", true, true);
        assert!(matches!(
            factory.get_managed_content(&repository).await.unwrap_err(),
            RepositoryError::UnsupportedRepositoryType(_)
        ));
    }

    #[tokio::test]
    async fn test_evict_detaches() {
        let factory = factory();
        let repository = repository("internal", "default", true, true);
        let content = factory.get_managed_content(&repository).await.unwrap();
        factory.evict("internal");
        assert!(!content.is_attached());
        assert!(factory.cached_managed_content("internal").is_none());
    }
}
