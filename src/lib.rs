//! Shared harness for the integration tests
//!
//! Wires a complete engine over in-memory storage and exposes the test
//! doubles the scenarios need: a storage spy with failure injection, a
//! configuration store that can refuse saves and an audit listener that
//! records everything.

use artifact_repo_core::{
    AssetReader, AssetStat, AuditEvent, ItemSelector, ManagedRepositoryConfig,
    RegistryConfiguration, RepositoryError, RepositoryStorage, Result,
};
use artifact_repo_service::{AuditListener, ManagedRepositoryContent, RepositoryServices};
use artifact_repo_storage::{ConfigurationStore, DefaultStorageProvider, InMemoryConfigurationStore, StorageProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use url::Url;

/// Storage wrapper recording every backend call as `"<op> <path>"`
pub struct TracingStorage {
    inner: Arc<dyn RepositoryStorage>,
    operations: Mutex<Vec<String>>,
    failing: Mutex<Vec<(Option<String>, String)>>,
}

impl TracingStorage {
    pub fn new(inner: Arc<dyn RepositoryStorage>) -> Self {
        Self {
            inner,
            operations: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call whose path starts with `prefix`
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.failing.lock().push((None, prefix.into()));
    }

    /// Fail one kind of call (`"delete"`, `"read"`, ...) under `prefix`
    pub fn inject_failure_for(&self, operation: &str, prefix: impl Into<String>) {
        self.failing
            .lock()
            .push((Some(operation.to_string()), prefix.into()));
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, operation: &str, path: &str) -> Result<()> {
        self.operations.lock().push(format!("{} {}", operation, path));
        let fails = self.failing.lock().iter().any(|(op, prefix)| {
            op.as_deref().map_or(true, |op| op == operation) && path.starts_with(prefix.as_str())
        });
        if fails {
            return Err(RepositoryError::access(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryStorage for TracingStorage {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn stat(&self, path: &str) -> Result<Option<AssetStat>> {
        self.record("stat", path)?;
        self.inner.stat(path).await
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.record("list", path)?;
        self.inner.list(path).await
    }

    async fn open_read(&self, path: &str) -> Result<AssetReader> {
        self.record("read", path)?;
        self.inner.open_read(path).await
    }

    async fn write(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        append: bool,
    ) -> Result<u64> {
        self.record("write", path)?;
        self.inner.write(path, reader, append).await
    }

    async fn create_container(&self, path: &str) -> Result<()> {
        self.record("mkdir", path)?;
        self.inner.create_container(path).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.record("delete", path)?;
        self.inner.delete(path).await
    }

    async fn move_asset(&self, from: &str, to: &str) -> Result<()> {
        self.record("move", from)?;
        self.record("move-to", to)?;
        self.inner.move_asset(from, to).await
    }

    async fn copy_asset(&self, from: &str, to: &str) -> Result<()> {
        self.record("copy", from)?;
        self.record("copy-to", to)?;
        self.inner.copy_asset(from, to).await
    }
}

/// Storage provider handing out one [`TracingStorage`] per location
#[derive(Default)]
pub struct TracingStorageProvider {
    inner: DefaultStorageProvider,
    opened: Mutex<HashMap<String, Arc<TracingStorage>>>,
}

impl TracingStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spy for a location string such as `mem:internal`
    pub fn storage(&self, location: &str) -> Option<Arc<TracingStorage>> {
        self.opened
            .lock()
            .get(location.trim_end_matches('/'))
            .cloned()
    }
}

#[async_trait]
impl StorageProvider for TracingStorageProvider {
    fn supports(&self, location: &Url) -> bool {
        self.inner.supports(location)
    }

    async fn open(&self, location: &Url) -> Result<Arc<dyn RepositoryStorage>> {
        let key = location.as_str().trim_end_matches('/').to_string();
        let existing = self.opened.lock().get(&key).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }
        let storage = Arc::new(TracingStorage::new(self.inner.open(location).await?));
        Ok(self.opened.lock().entry(key).or_insert(storage).clone())
    }
}

/// Configuration store that can be told to reject saves
pub struct FailingConfigurationStore {
    inner: InMemoryConfigurationStore,
    fail_saves: AtomicBool,
}

impl FailingConfigurationStore {
    pub fn new(configuration: RegistryConfiguration) -> Self {
        Self {
            inner: InMemoryConfigurationStore::new(configuration),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved configuration
    pub fn snapshot(&self) -> RegistryConfiguration {
        self.inner.snapshot()
    }

    pub fn save_count(&self) -> usize {
        self.inner.save_count()
    }
}

#[async_trait]
impl ConfigurationStore for FailingConfigurationStore {
    async fn load(&self) -> Result<RegistryConfiguration> {
        self.inner.load().await
    }

    async fn save(&self, configuration: &RegistryConfiguration) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::access(
                "registry.toml",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only store"),
            ));
        }
        self.inner.save(configuration).await
    }
}

/// Audit listener keeping every event in memory
#[derive(Default)]
pub struct RecordingAuditListener {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditListener {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Paths of the recorded events, in order
    pub fn paths(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| e.resource_path.clone())
            .collect()
    }
}

#[async_trait]
impl AuditListener for RecordingAuditListener {
    async fn audit_event(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// A fully wired engine over spied in-memory storage
pub struct TestEnvironment {
    pub dir: TempDir,
    pub store: Arc<FailingConfigurationStore>,
    pub storage: Arc<TracingStorageProvider>,
    pub audit: Arc<RecordingAuditListener>,
    pub services: RepositoryServices,
}

impl TestEnvironment {
    /// Empty, initialized registry
    pub async fn new() -> Self {
        Self::with_configuration(RegistryConfiguration::default()).await
    }

    pub async fn with_configuration(configuration: RegistryConfiguration) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(FailingConfigurationStore::new(configuration));
        let storage = Arc::new(TracingStorageProvider::new());
        let services = RepositoryServices::with_storage(store.clone(), dir.path(), storage.clone());
        let audit = Arc::new(RecordingAuditListener::default());
        services.audit.add_listener(audit.clone());
        services
            .registry
            .initialize()
            .await
            .expect("registry initialization");
        Self {
            dir,
            store,
            storage,
            audit,
            services,
        }
    }

    /// Register a managed repository at `mem:<id>` and return its content
    pub async fn managed(&self, id: &str) -> Arc<ManagedRepositoryContent> {
        self.managed_with(ManagedRepositoryConfig::new(id, format!("mem:{}", id)))
            .await
    }

    pub async fn managed_with(&self, config: ManagedRepositoryConfig) -> Arc<ManagedRepositoryContent> {
        let id = config.id.clone();
        self.services
            .registry
            .put_managed(config)
            .await
            .expect("managed repository registration");
        self.services
            .registry
            .managed_content(&id)
            .await
            .expect("managed content")
    }

    /// Storage spy behind a managed repository registered with [`managed`](Self::managed)
    pub fn spy(&self, id: &str) -> Arc<TracingStorage> {
        self.storage
            .storage(&format!("mem:{}", id))
            .expect("storage opened for repository")
    }

    /// Write raw files into a repository, bypassing the content layer
    pub async fn seed(&self, content: &ManagedRepositoryContent, paths: &[&str]) {
        for path in paths {
            content
                .asset(path)
                .expect("valid path")
                .write_bytes(path.as_bytes())
                .await
                .expect("seed write");
        }
    }
}

/// Selector for a Maven artifact file
pub fn artifact_selector(
    namespace: &str,
    project: &str,
    version: &str,
    artifact_version: &str,
    extension: &str,
) -> ItemSelector {
    ItemSelector::builder()
        .namespace(namespace)
        .project_id(project)
        .version(version)
        .artifact_id(project)
        .artifact_version(artifact_version)
        .extension(extension)
        .build()
}

/// Selector for a version container
pub fn version_selector(namespace: &str, project: &str, version: &str) -> ItemSelector {
    ItemSelector::builder()
        .namespace(namespace)
        .project_id(project)
        .version(version)
        .build()
}
