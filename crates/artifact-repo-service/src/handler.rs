//! Per-kind repository handlers
//!
//! Each handler owns the id map of one repository kind and implements the
//! lifecycle for it: building instances from configuration, registering
//! them (persisting first), activating content and scanning, and tearing
//! them down. Handlers assume the caller serializes structural changes;
//! [`RepositoryRegistry`](crate::registry::RepositoryRegistry) holds the
//! lock for them.

use artifact_repo_core::{
    LifecycleState, ManagedRepositoryConfig, RegistryConfiguration, RemoteRepositoryConfig,
    Repository, RepositoryError, RepositoryEvent, RepositoryEventType, RepositoryGroupConfig,
    RepositoryKind, Result,
};
use artifact_repo_storage::ConfigurationStore;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::factory::RepositoryContentFactory;
use crate::provider::RepositoryProvider;
use crate::scanning::ScanScheduler;
use crate::validation::{RepositoryChecker, ValidationResult};

/// State shared by the handlers of one registry
pub struct HandlerContext {
    pub(crate) store: Arc<dyn ConfigurationStore>,
    pub(crate) provider: Arc<dyn RepositoryProvider>,
    pub(crate) content: Arc<RepositoryContentFactory>,
    pub(crate) scheduler: Arc<ScanScheduler>,
    pub(crate) configuration: RwLock<RegistryConfiguration>,
    pub(crate) events: broadcast::Sender<RepositoryEvent>,
}

impl HandlerContext {
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        provider: Arc<dyn RepositoryProvider>,
        content: Arc<RepositoryContentFactory>,
        scheduler: Arc<ScanScheduler>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            provider,
            content,
            scheduler,
            configuration: RwLock::new(RegistryConfiguration::default()),
            events,
        }
    }

    /// Current persisted configuration
    pub fn configuration(&self) -> RegistryConfiguration {
        self.configuration.read().clone()
    }

    /// Persist `next` and make it current. Nothing changes on failure.
    pub(crate) async fn persist(&self, next: RegistryConfiguration) -> Result<()> {
        self.store.save(&next).await?;
        *self.configuration.write() = next;
        Ok(())
    }

    pub(crate) fn publish(&self, event: RepositoryEvent) {
        debug!(event = %event, "Publishing repository event");
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

fn event(event_type: RepositoryEventType, repository: &Repository) -> RepositoryEvent {
    RepositoryEvent::new(event_type, repository.id().clone())
}

/// Lifecycle operations for one repository kind
#[async_trait]
pub trait RepositoryHandler: Send + Sync {
    type Config: Clone + Send + Sync + 'static;

    fn kind(&self) -> RepositoryKind;

    fn context(&self) -> &HandlerContext;

    fn repositories(&self) -> &DashMap<String, Arc<Repository>>;

    /// Build an unregistered instance. No side effects.
    fn new_instance(&self, config: &Self::Config) -> Result<Repository>;

    /// Configuration record of an instance
    fn configuration_of(&self, repository: &Repository) -> Result<Self::Config>;

    fn has_config(&self, configuration: &RegistryConfiguration, id: &str) -> bool;

    fn store_config(&self, configuration: &mut RegistryConfiguration, config: Self::Config);

    fn remove_config(&self, configuration: &mut RegistryConfiguration, id: &str) -> bool;

    /// Wire content and background work, then move to `Activated`
    async fn activate(&self, repository: &Arc<Repository>) -> Result<()>;

    /// Stop background work and move to `Deactivated`
    async fn deactivate(&self, repository: &Arc<Repository>);

    /// Drop references to `removed` from the configuration of this kind.
    /// Returns the ids whose configuration changed.
    fn update_references(&self, _configuration: &mut RegistryConfiguration, _removed: &str) -> Vec<String> {
        Vec::new()
    }

    /// Rebuild the instances whose references changed after another
    /// repository was removed
    async fn process_other_variant_removal(&self, _removed: &Repository, _changed: &[String]) {}

    fn get(&self, id: &str) -> Option<Arc<Repository>> {
        self.repositories().get(id).map(|r| r.clone())
    }

    /// All instances of this kind, ordered by id
    fn all(&self) -> Vec<Arc<Repository>> {
        let mut repositories: Vec<Arc<Repository>> =
            self.repositories().iter().map(|r| r.value().clone()).collect();
        repositories.sort_by(|a, b| a.id().cmp(b.id()));
        repositories
    }

    fn check(
        &self,
        config: &Self::Config,
        checker: &dyn RepositoryChecker<Self::Config>,
    ) -> ValidationResult {
        checker.check(config, &self.context().configuration.read())
    }

    /// Register a configuration, replacing any instance with the same id
    async fn put(&self, config: Self::Config) -> Result<Arc<Repository>> {
        let instance = self.new_instance(&config)?;
        self.put_instance(instance, config).await
    }

    /// Validate, then register. Nothing is registered or persisted unless
    /// every check passes.
    async fn put_with_check(
        &self,
        config: Self::Config,
        checker: &dyn RepositoryChecker<Self::Config>,
    ) -> Result<Arc<Repository>> {
        let warnings = self.check(&config, checker).into_result()?;
        for warning in &warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }
        self.put(config).await
    }

    /// Register an instance with its configuration record.
    ///
    /// The configuration is persisted before the in-memory map changes; if
    /// activation fails afterwards both are rolled back to the prior state.
    async fn put_instance(&self, instance: Repository, config: Self::Config) -> Result<Arc<Repository>> {
        let ctx = self.context();
        let id = instance.id().to_string();
        let instance = Arc::new(instance);
        if instance.state() != LifecycleState::Unregistered {
            return Err(RepositoryError::InvalidState(format!(
                "Repository '{}' is already {}",
                id,
                instance.state()
            )));
        }

        let previous_configuration = ctx.configuration();
        if previous_configuration.contains_id(&id) && !self.has_config(&previous_configuration, &id) {
            return Err(RepositoryError::Conflict(format!(
                "Id '{}' is already used by a repository of another kind",
                id
            )));
        }
        if self.kind() != RepositoryKind::Group
            && !ctx.content.supports(instance.repository_type(), instance.layout())
        {
            return Err(RepositoryError::UnsupportedRepositoryType(format!(
                "{} repositories with layout '{}'",
                instance.repository_type(),
                instance.layout()
            )));
        }

        let mut next = previous_configuration.clone();
        self.store_config(&mut next, config);
        ctx.persist(next).await?;

        instance.transition(LifecycleState::Registered)?;
        let previous = self.repositories().insert(id.clone(), instance.clone());

        if let Err(e) = self.activate(&instance).await {
            error!(repository = %id, error = %e, "Activation failed, rolling back");
            match &previous {
                Some(old) => {
                    self.repositories().insert(id.clone(), old.clone());
                }
                None => {
                    self.repositories().remove(&id);
                }
            }
            let _ = instance.transition(LifecycleState::Removed);
            if let Err(save) = ctx.persist(previous_configuration).await {
                error!(repository = %id, error = %save, "Could not restore configuration");
            }
            return Err(e);
        }

        match previous {
            Some(old) => {
                let _ = old.transition(LifecycleState::Removed);
                ctx.publish(event(RepositoryEventType::Updated, &instance).with_values(
                    Some(old.location().to_string()),
                    Some(instance.location().to_string()),
                ));
                info!(repository = %id, kind = %self.kind(), "Updated repository");
            }
            None => {
                ctx.publish(event(RepositoryEventType::Registered, &instance));
                info!(repository = %id, kind = %self.kind(), "Registered repository");
            }
        }
        ctx.publish(event(RepositoryEventType::Activated, &instance));
        Ok(instance)
    }

    /// Register a configuration that is already persisted (startup, reload)
    async fn register_loaded(&self, config: &Self::Config) -> Result<Arc<Repository>> {
        let instance = Arc::new(self.new_instance(config)?);
        let id = instance.id().to_string();
        instance.transition(LifecycleState::Registered)?;
        self.repositories().insert(id.clone(), instance.clone());
        if let Err(e) = self.activate(&instance).await {
            self.repositories().remove(&id);
            let _ = instance.transition(LifecycleState::Removed);
            return Err(e);
        }
        let ctx = self.context();
        ctx.publish(event(RepositoryEventType::Registered, &instance));
        ctx.publish(event(RepositoryEventType::Activated, &instance));
        Ok(instance)
    }

    /// Drop the instance from the map after its configuration is gone
    async fn deregister(&self, id: &str) -> Option<Arc<Repository>> {
        let (_, repository) = self.repositories().remove(id)?;
        self.deactivate(&repository).await;
        let _ = repository.transition(LifecycleState::Removed);
        let ctx = self.context();
        ctx.content.evict(id);
        ctx.publish(event(RepositoryEventType::Removed, &repository));
        info!(repository = %id, kind = %self.kind(), "Removed repository");
        Some(repository)
    }

    /// Detach everything without touching configuration (reload, close)
    async fn discard_all(&self) {
        let repositories: Vec<Arc<Repository>> =
            self.repositories().iter().map(|r| r.value().clone()).collect();
        self.repositories().clear();
        for repository in repositories {
            self.deactivate(&repository).await;
            let _ = repository.transition(LifecycleState::Removed);
        }
    }
}

fn deactivate_state(repository: &Repository) -> bool {
    match repository.transition(LifecycleState::Deactivated) {
        Ok(_) => true,
        Err(e) => {
            debug!(repository = %repository.id(), error = %e, "Not deactivated");
            false
        }
    }
}

/// Managed repositories: content plus scheduled scanning
pub struct ManagedRepositoryHandler {
    context: Arc<HandlerContext>,
    repositories: DashMap<String, Arc<Repository>>,
}

impl ManagedRepositoryHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self {
            context,
            repositories: DashMap::new(),
        }
    }
}

#[async_trait]
impl RepositoryHandler for ManagedRepositoryHandler {
    type Config = ManagedRepositoryConfig;

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Managed
    }

    fn context(&self) -> &HandlerContext {
        &self.context
    }

    fn repositories(&self) -> &DashMap<String, Arc<Repository>> {
        &self.repositories
    }

    fn new_instance(&self, config: &ManagedRepositoryConfig) -> Result<Repository> {
        self.context.provider.create_managed_instance(config)
    }

    fn configuration_of(&self, repository: &Repository) -> Result<ManagedRepositoryConfig> {
        self.context.provider.managed_configuration(repository)
    }

    fn has_config(&self, configuration: &RegistryConfiguration, id: &str) -> bool {
        configuration.find_managed(id).is_some()
    }

    fn store_config(&self, configuration: &mut RegistryConfiguration, config: ManagedRepositoryConfig) {
        configuration.upsert_managed(config);
    }

    fn remove_config(&self, configuration: &mut RegistryConfiguration, id: &str) -> bool {
        configuration.remove_managed(id).is_some()
    }

    #[instrument(skip(self, repository), fields(repository = %repository.id()))]
    async fn activate(&self, repository: &Arc<Repository>) -> Result<()> {
        let content = self.context.content.get_managed_content(repository).await?;
        repository.transition(LifecycleState::Activated)?;

        let id = repository.id().as_str();
        match repository.managed_settings().and_then(|s| s.scan_interval) {
            Some(interval) => self.context.scheduler.schedule(
                content,
                interval,
                repository.features().artifact_cleanup().cloned(),
            ),
            None => {
                self.context.scheduler.stop(id);
            }
        }
        debug!("Activated managed repository");
        Ok(())
    }

    async fn deactivate(&self, repository: &Arc<Repository>) {
        self.context.scheduler.stop(repository.id().as_str());
        deactivate_state(repository);
    }
}

/// Remote repositories
pub struct RemoteRepositoryHandler {
    context: Arc<HandlerContext>,
    repositories: DashMap<String, Arc<Repository>>,
}

impl RemoteRepositoryHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self {
            context,
            repositories: DashMap::new(),
        }
    }
}

#[async_trait]
impl RepositoryHandler for RemoteRepositoryHandler {
    type Config = RemoteRepositoryConfig;

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Remote
    }

    fn context(&self) -> &HandlerContext {
        &self.context
    }

    fn repositories(&self) -> &DashMap<String, Arc<Repository>> {
        &self.repositories
    }

    fn new_instance(&self, config: &RemoteRepositoryConfig) -> Result<Repository> {
        self.context.provider.create_remote_instance(config)
    }

    fn configuration_of(&self, repository: &Repository) -> Result<RemoteRepositoryConfig> {
        self.context.provider.remote_configuration(repository)
    }

    fn has_config(&self, configuration: &RegistryConfiguration, id: &str) -> bool {
        configuration.find_remote(id).is_some()
    }

    fn store_config(&self, configuration: &mut RegistryConfiguration, config: RemoteRepositoryConfig) {
        configuration.upsert_remote(config);
    }

    fn remove_config(&self, configuration: &mut RegistryConfiguration, id: &str) -> bool {
        configuration.remove_remote(id).is_some()
    }

    async fn activate(&self, repository: &Arc<Repository>) -> Result<()> {
        self.context.content.get_remote_content(repository).await?;
        repository.transition(LifecycleState::Activated)?;
        Ok(())
    }

    async fn deactivate(&self, repository: &Arc<Repository>) {
        deactivate_state(repository);
    }
}

/// Repository groups
pub struct RepositoryGroupHandler {
    context: Arc<HandlerContext>,
    repositories: DashMap<String, Arc<Repository>>,
}

impl RepositoryGroupHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self {
            context,
            repositories: DashMap::new(),
        }
    }

    /// Groups that list `member`
    pub fn groups_containing(&self, member: &str) -> Vec<Arc<Repository>> {
        self.all()
            .into_iter()
            .filter(|g| {
                g.group_settings()
                    .map(|s| s.members.iter().any(|m| m.as_str() == member))
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[async_trait]
impl RepositoryHandler for RepositoryGroupHandler {
    type Config = RepositoryGroupConfig;

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Group
    }

    fn context(&self) -> &HandlerContext {
        &self.context
    }

    fn repositories(&self) -> &DashMap<String, Arc<Repository>> {
        &self.repositories
    }

    fn new_instance(&self, config: &RepositoryGroupConfig) -> Result<Repository> {
        self.context.provider.create_repository_group(config)
    }

    fn configuration_of(&self, repository: &Repository) -> Result<RepositoryGroupConfig> {
        self.context.provider.group_configuration(repository)
    }

    fn has_config(&self, configuration: &RegistryConfiguration, id: &str) -> bool {
        configuration.find_group(id).is_some()
    }

    fn store_config(&self, configuration: &mut RegistryConfiguration, config: RepositoryGroupConfig) {
        configuration.upsert_group(config);
    }

    fn remove_config(&self, configuration: &mut RegistryConfiguration, id: &str) -> bool {
        configuration.remove_group(id).is_some()
    }

    async fn activate(&self, repository: &Arc<Repository>) -> Result<()> {
        repository.transition(LifecycleState::Activated)?;
        Ok(())
    }

    async fn deactivate(&self, repository: &Arc<Repository>) {
        deactivate_state(repository);
    }

    fn update_references(&self, configuration: &mut RegistryConfiguration, removed: &str) -> Vec<String> {
        configuration.remove_group_memberships(removed)
    }

    async fn process_other_variant_removal(&self, removed: &Repository, changed: &[String]) {
        for group_id in changed {
            let config = match self.context.configuration.read().find_group(group_id) {
                Some(config) => config.clone(),
                None => continue,
            };
            let instance = match self.new_instance(&config) {
                Ok(instance) => Arc::new(instance),
                Err(e) => {
                    warn!(group = %group_id, error = %e, "Could not rebuild group");
                    continue;
                }
            };
            if let Err(e) = instance.transition(LifecycleState::Registered) {
                warn!(group = %group_id, error = %e, "Could not rebuild group");
                continue;
            }
            let previous = self.repositories.insert(group_id.clone(), instance.clone());
            if let Err(e) = self.activate(&instance).await {
                warn!(group = %group_id, error = %e, "Could not activate rebuilt group");
            }
            if let Some(old) = previous {
                let _ = old.transition(LifecycleState::Removed);
            }
            self.context.publish(
                event(RepositoryEventType::ReferencesUpdated, &instance)
                    .with_values(Some(removed.id().to_string()), None),
            );
            info!(group = %group_id, removed = %removed.id(), "Dropped member from group");
        }
    }
}
