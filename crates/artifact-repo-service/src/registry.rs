//! Repository registry
//!
//! The registry owns the repository handlers and reconciles them with the
//! persisted [`RegistryConfiguration`]. Reads go straight to the handlers'
//! concurrent maps; structural changes (`put_*`, `remove`, `reload`, proxy
//! connector edits) are serialized by one async mutex so the persisted and
//! in-memory states cannot diverge.

use artifact_repo_core::{
    ManagedRepositoryConfig, ProxyConnectorConfig, RegistryConfiguration, RemoteRepositoryConfig,
    Repository, RepositoryError, RepositoryEvent, RepositoryEventType, RepositoryGroupConfig,
    RepositoryKind, Result,
};
use artifact_repo_storage::ConfigurationStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, instrument, warn};

use crate::content::ManagedRepositoryContent;
use crate::factory::RepositoryContentFactory;
use crate::handler::{
    HandlerContext, ManagedRepositoryHandler, RemoteRepositoryHandler, RepositoryGroupHandler,
    RepositoryHandler,
};
use crate::provider::RepositoryProvider;
use crate::remote::RemoteRepositoryContent;
use crate::scanning::{RepositoryStatistics, ScanScheduler};
use crate::validation::RepositoryChecker;

/// Default capacity of the lifecycle event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Registry of managed, remote and group repositories
pub struct RepositoryRegistry {
    context: Arc<HandlerContext>,
    managed: ManagedRepositoryHandler,
    remote: RemoteRepositoryHandler,
    groups: RepositoryGroupHandler,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("managed", &self.managed.repositories().len())
            .field("remote", &self.remote.repositories().len())
            .field("groups", &self.groups.repositories().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl RepositoryRegistry {
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        provider: Arc<dyn RepositoryProvider>,
        content: Arc<RepositoryContentFactory>,
    ) -> Self {
        Self::with_scheduler(store, provider, content, Arc::new(ScanScheduler::new()))
    }

    pub fn with_scheduler(
        store: Arc<dyn ConfigurationStore>,
        provider: Arc<dyn RepositoryProvider>,
        content: Arc<RepositoryContentFactory>,
        scheduler: Arc<ScanScheduler>,
    ) -> Self {
        let context = Arc::new(HandlerContext::new(
            store,
            provider,
            content,
            scheduler,
            DEFAULT_EVENT_CAPACITY,
        ));
        Self {
            managed: ManagedRepositoryHandler::new(context.clone()),
            remote: RemoteRepositoryHandler::new(context.clone()),
            groups: RepositoryGroupHandler::new(context.clone()),
            context,
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RepositoryError::InvalidState(
                "Repository registry is closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the persisted configuration and bring every repository up.
    ///
    /// A repository that fails to activate is skipped with a warning; the
    /// others still come up.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let configuration = self.context.store.load().await?;
        self.build(configuration).await;
        info!(
            managed = self.managed.repositories().len(),
            remote = self.remote.repositories().len(),
            groups = self.groups.repositories().len(),
            "Repository registry initialized"
        );
        Ok(())
    }

    async fn build(&self, configuration: RegistryConfiguration) {
        *self.context.configuration.write() = configuration.clone();
        for config in &configuration.managed_repositories {
            if let Err(e) = self.managed.register_loaded(config).await {
                warn!(repository = %config.id, error = %e, "Skipping managed repository");
            }
        }
        for config in &configuration.remote_repositories {
            if let Err(e) = self.remote.register_loaded(config).await {
                warn!(repository = %config.id, error = %e, "Skipping remote repository");
            }
        }
        for config in &configuration.repository_groups {
            if let Err(e) = self.groups.register_loaded(config).await {
                warn!(repository = %config.id, error = %e, "Skipping repository group");
            }
        }
    }

    async fn discard(&self) {
        self.groups.discard_all().await;
        self.remote.discard_all().await;
        self.managed.discard_all().await;
        self.context.scheduler.stop_all();
        self.context.content.clear();
    }

    /// Discard every instance and rebuild from the persisted configuration.
    ///
    /// Content handed out before the reload is detached; writes through it
    /// fail with `InvalidState`. If the configuration cannot be loaded the
    /// current state is kept.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let configuration = self.context.store.load().await?;
        self.discard().await;
        self.build(configuration).await;
        self.context
            .publish(RepositoryEvent::registry(RepositoryEventType::Reloaded));
        info!("Repository registry reloaded");
        Ok(())
    }

    /// Stop scanning and detach all content. The registry rejects further
    /// structural changes.
    pub async fn close(&self) {
        let _guard = self.lock.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.discard().await;
        info!("Repository registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Lifecycle events published by this registry
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.context.events.subscribe()
    }

    /// Snapshot of the persisted configuration
    pub fn configuration(&self) -> RegistryConfiguration {
        self.context.configuration()
    }

    pub fn content_factory(&self) -> &Arc<RepositoryContentFactory> {
        &self.context.content
    }

    pub fn scan_statistics(&self, id: &str) -> Option<RepositoryStatistics> {
        self.context.scheduler.statistics(id)
    }

    // Lookups

    pub fn get_managed_repository(&self, id: &str) -> Option<Arc<Repository>> {
        self.managed.get(id)
    }

    pub fn get_remote_repository(&self, id: &str) -> Option<Arc<Repository>> {
        self.remote.get(id)
    }

    pub fn get_repository_group(&self, id: &str) -> Option<Arc<Repository>> {
        self.groups.get(id)
    }

    /// Managed or remote repository
    pub fn get_repository(&self, id: &str) -> Option<Arc<Repository>> {
        self.managed.get(id).or_else(|| self.remote.get(id))
    }

    /// Repository of any kind
    pub fn find(&self, id: &str) -> Option<Arc<Repository>> {
        self.get_repository(id).or_else(|| self.groups.get(id))
    }

    pub fn managed_repositories(&self) -> Vec<Arc<Repository>> {
        self.managed.all()
    }

    pub fn remote_repositories(&self) -> Vec<Arc<Repository>> {
        self.remote.all()
    }

    pub fn repository_groups(&self) -> Vec<Arc<Repository>> {
        self.groups.all()
    }

    /// Groups listing `member`
    pub fn groups_containing(&self, member: &str) -> Vec<Arc<Repository>> {
        self.groups.groups_containing(member)
    }

    /// Content of a registered managed repository
    pub async fn managed_content(&self, id: &str) -> Result<Arc<ManagedRepositoryContent>> {
        let repository = self
            .managed
            .get(id)
            .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;
        self.context.content.get_managed_content(&repository).await
    }

    /// Content of a registered remote repository
    pub async fn remote_content(&self, id: &str) -> Result<Arc<RemoteRepositoryContent>> {
        let repository = self
            .remote
            .get(id)
            .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;
        self.context.content.get_remote_content(&repository).await
    }

    // Registration

    pub async fn put_managed(&self, config: ManagedRepositoryConfig) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.managed.put(config).await
    }

    pub async fn put_remote(&self, config: RemoteRepositoryConfig) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.remote.put(config).await
    }

    pub async fn put_group(&self, config: RepositoryGroupConfig) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.groups.put(config).await
    }

    pub async fn put_managed_with_check(
        &self,
        config: ManagedRepositoryConfig,
        checker: &dyn RepositoryChecker<ManagedRepositoryConfig>,
    ) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.managed.put_with_check(config, checker).await
    }

    pub async fn put_remote_with_check(
        &self,
        config: RemoteRepositoryConfig,
        checker: &dyn RepositoryChecker<RemoteRepositoryConfig>,
    ) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.remote.put_with_check(config, checker).await
    }

    pub async fn put_group_with_check(
        &self,
        config: RepositoryGroupConfig,
        checker: &dyn RepositoryChecker<RepositoryGroupConfig>,
    ) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        self.groups.put_with_check(config, checker).await
    }

    /// Register an unregistered instance; its configuration record is
    /// derived through the provider
    pub async fn put_repository(&self, repository: Repository) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        match repository.kind() {
            RepositoryKind::Managed => {
                let config = self.managed.configuration_of(&repository)?;
                self.managed.put_instance(repository, config).await
            }
            RepositoryKind::Remote => {
                let config = self.remote.configuration_of(&repository)?;
                self.remote.put_instance(repository, config).await
            }
            RepositoryKind::Group => {
                let config = self.groups.configuration_of(&repository)?;
                self.groups.put_instance(repository, config).await
            }
        }
    }

    /// Remove a repository of any kind.
    ///
    /// Group memberships and proxy connectors referring to it are dropped
    /// in the same persisted update. Nothing changes if persisting fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<Arc<Repository>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let kind = self
            .find(id)
            .map(|r| r.kind())
            .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;

        let mut next = self.context.configuration();
        match kind {
            RepositoryKind::Managed => self.managed.remove_config(&mut next, id),
            RepositoryKind::Remote => self.remote.remove_config(&mut next, id),
            RepositoryKind::Group => self.groups.remove_config(&mut next, id),
        };
        let changed_groups = match kind {
            RepositoryKind::Group => Vec::new(),
            _ => self.groups.update_references(&mut next, id),
        };
        let connectors = next.remove_proxy_connectors(id);
        self.context.persist(next).await?;

        let removed = match kind {
            RepositoryKind::Managed => self.managed.deregister(id).await,
            RepositoryKind::Remote => self.remote.deregister(id).await,
            RepositoryKind::Group => self.groups.deregister(id).await,
        }
        .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;

        if !changed_groups.is_empty() {
            self.groups
                .process_other_variant_removal(&removed, &changed_groups)
                .await;
        }
        if connectors > 0 {
            info!(repository = %id, connectors, "Removed proxy connectors");
        }
        Ok(removed)
    }

    /// Take a managed repository offline without removing it
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let repository = self
            .find(id)
            .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;
        match repository.kind() {
            RepositoryKind::Managed => self.managed.deactivate(&repository).await,
            RepositoryKind::Remote => self.remote.deactivate(&repository).await,
            RepositoryKind::Group => self.groups.deactivate(&repository).await,
        }
        self.context.publish(RepositoryEvent::new(
            RepositoryEventType::Deactivated,
            repository.id().clone(),
        ));
        Ok(())
    }

    /// Bring a deactivated repository back
    pub async fn activate(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let repository = self
            .find(id)
            .ok_or_else(|| RepositoryError::RepositoryNotFound(id.to_string()))?;
        match repository.kind() {
            RepositoryKind::Managed => self.managed.activate(&repository).await?,
            RepositoryKind::Remote => self.remote.activate(&repository).await?,
            RepositoryKind::Group => self.groups.activate(&repository).await?,
        }
        self.context.publish(RepositoryEvent::new(
            RepositoryEventType::Activated,
            repository.id().clone(),
        ));
        Ok(())
    }

    // Proxy connectors

    /// Add or replace the connector between a managed source and a remote
    /// target
    pub async fn add_proxy_connector(&self, connector: ProxyConnectorConfig) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let source = self.managed.get(&connector.source_repo_id).ok_or_else(|| {
            RepositoryError::InvalidArgument(format!(
                "Proxy connector source '{}' is not a managed repository",
                connector.source_repo_id
            ))
        })?;
        if self.remote.get(&connector.target_repo_id).is_none() {
            return Err(RepositoryError::InvalidArgument(format!(
                "Proxy connector target '{}' is not a remote repository",
                connector.target_repo_id
            )));
        }

        let mut next = self.context.configuration();
        match next.proxy_connectors.iter_mut().find(|c| {
            c.source_repo_id == connector.source_repo_id && c.target_repo_id == connector.target_repo_id
        }) {
            Some(existing) => *existing = connector.clone(),
            None => next.proxy_connectors.push(connector.clone()),
        }
        self.context.persist(next).await?;
        self.context.publish(
            RepositoryEvent::new(RepositoryEventType::ReferencesUpdated, source.id().clone())
                .with_values(None, Some(connector.target_repo_id.clone())),
        );
        info!(
            source = %connector.source_repo_id,
            target = %connector.target_repo_id,
            order = connector.order,
            "Added proxy connector"
        );
        Ok(())
    }

    /// Remove a connector. Returns whether one existed.
    pub async fn remove_proxy_connector(&self, source: &str, target: &str) -> Result<bool> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let mut next = self.context.configuration();
        let before = next.proxy_connectors.len();
        next.proxy_connectors
            .retain(|c| !(c.source_repo_id == source && c.target_repo_id == target));
        if next.proxy_connectors.len() == before {
            return Ok(false);
        }
        if let Err(e) = self.context.persist(next).await {
            error!(source, target, error = %e, "Could not persist connector removal");
            return Err(e);
        }
        Ok(true)
    }

    /// Enabled connectors of a managed repository, in consultation order
    pub fn proxy_connectors_for(&self, source: &str) -> Vec<ProxyConnectorConfig> {
        self.context
            .configuration
            .read()
            .connectors_for(source)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditDispatcher;
    use crate::factory::MavenContentProvider;
    use crate::provider::MavenRepositoryProvider;
    use crate::validation::DefaultRepositoryChecker;
    use artifact_repo_core::LifecycleState;
    use artifact_repo_storage::{DefaultStorageProvider, InMemoryConfigurationStore};

    fn registry(configuration: RegistryConfiguration) -> (RepositoryRegistry, Arc<InMemoryConfigurationStore>) {
        let store = Arc::new(InMemoryConfigurationStore::new(configuration));
        let content = Arc::new(RepositoryContentFactory::new(vec![Arc::new(
            MavenContentProvider::new(
                Arc::new(DefaultStorageProvider::new()),
                Arc::new(AuditDispatcher::new()),
            ),
        )]));
        let registry = RepositoryRegistry::new(
            store.clone(),
            Arc::new(MavenRepositoryProvider::new("/srv/repos")),
            content,
        );
        (registry, store)
    }

    fn managed(id: &str) -> ManagedRepositoryConfig {
        ManagedRepositoryConfig::new(id, format!("mem:{}", id))
    }

    #[tokio::test]
    async fn test_initialize_skips_broken_entries() {
        let mut configuration = RegistryConfiguration::default();
        configuration.upsert_managed(managed("internal"));
        let mut broken = managed("broken");
        broken.layout = "p2".to_string();
        configuration.upsert_managed(broken);
        configuration.upsert_group(RepositoryGroupConfig::new("public", vec!["internal".into()]));

        let (registry, _) = registry(configuration);
        registry.initialize().await.unwrap();
        assert!(registry.get_managed_repository("internal").unwrap().is_active());
        assert!(registry.get_managed_repository("broken").is_none());
        assert!(registry.get_repository_group("public").unwrap().is_active());
        assert!(registry.managed_content("internal").await.unwrap().is_attached());
    }

    #[tokio::test]
    async fn test_put_replaces_and_publishes() {
        let (registry, store) = registry(RegistryConfiguration::default());
        let mut events = registry.subscribe();

        let first = registry.put_managed(managed("internal")).await.unwrap();
        let mut updated = managed("internal");
        updated.snapshots = true;
        let second = registry.put_managed(updated).await.unwrap();

        assert_eq!(first.state(), LifecycleState::Removed);
        assert!(second.is_active());
        assert!(store.snapshot().find_managed("internal").unwrap().snapshots);

        let kinds: Vec<RepositoryEventType> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                RepositoryEventType::Registered,
                RepositoryEventType::Activated,
                RepositoryEventType::Updated,
                RepositoryEventType::Activated,
            ]
        );
    }

    #[tokio::test]
    async fn test_ids_unique_across_kinds() {
        let (registry, _) = registry(RegistryConfiguration::default());
        registry.put_managed(managed("internal")).await.unwrap();
        let err = registry
            .put_remote(RemoteRepositoryConfig::new("internal", "mem:elsewhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_put_with_check_rejects_without_side_effects() {
        let (registry, store) = registry(RegistryConfiguration::default());
        let mut config = managed("internal");
        config.releases = false;
        config.retention_count = 0;

        let err = registry
            .put_managed_with_check(config, &DefaultRepositoryChecker::new())
            .await
            .unwrap_err();
        assert_eq!(err.validation_errors().len(), 2);
        assert!(registry.get_managed_repository("internal").is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_updates_references_in_one_save() {
        let (registry, store) = registry(RegistryConfiguration::default());
        registry.put_managed(managed("a")).await.unwrap();
        registry.put_managed(managed("b")).await.unwrap();
        registry
            .put_remote(RemoteRepositoryConfig::new("central", "mem:central"))
            .await
            .unwrap();
        registry
            .put_group(RepositoryGroupConfig::new("public", vec!["a".into(), "b".into()]))
            .await
            .unwrap();
        registry
            .add_proxy_connector(ProxyConnectorConfig::new("a", "central"))
            .await
            .unwrap();
        let saves = store.save_count();

        let removed = registry.remove("a").await.unwrap();
        assert_eq!(removed.state(), LifecycleState::Removed);
        assert_eq!(store.save_count(), saves + 1);

        let persisted = store.snapshot();
        assert_eq!(persisted.find_group("public").unwrap().members, vec!["b".to_string()]);
        assert!(persisted.proxy_connectors.is_empty());

        let group = registry.get_repository_group("public").unwrap();
        assert_eq!(group.group_settings().unwrap().members.len(), 1);
        assert!(group.is_active());
        assert!(registry.managed_content("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_proxy_connector_validation() {
        let (registry, _) = registry(RegistryConfiguration::default());
        registry.put_managed(managed("internal")).await.unwrap();
        let err = registry
            .add_proxy_connector(ProxyConnectorConfig::new("internal", "missing"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        registry
            .put_remote(RemoteRepositoryConfig::new("central", "mem:central"))
            .await
            .unwrap();
        registry
            .add_proxy_connector(ProxyConnectorConfig::new("internal", "central"))
            .await
            .unwrap();
        assert_eq!(registry.proxy_connectors_for("internal").len(), 1);
        assert!(registry.remove_proxy_connector("internal", "central").await.unwrap());
        assert!(!registry.remove_proxy_connector("internal", "central").await.unwrap());
    }

    #[tokio::test]
    async fn test_reload_detaches_content() {
        let (registry, _) = registry(RegistryConfiguration::default());
        registry.put_managed(managed("internal")).await.unwrap();
        let before = registry.managed_content("internal").await.unwrap();

        registry.reload().await.unwrap();
        let after = registry.managed_content("internal").await.unwrap();
        assert!(!before.is_attached());
        assert!(after.is_attached());
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_closed_registry_rejects_changes() {
        let (registry, _) = registry(RegistryConfiguration::default());
        registry.close().await;
        assert!(matches!(
            registry.put_managed(managed("internal")).await.unwrap_err(),
            RepositoryError::InvalidState(_)
        ));
    }
}
