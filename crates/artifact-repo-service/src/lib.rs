//! Service layer for the artifact repository engine
//!
//! This crate sits between storage and the server binary. It implements
//! layout-aware content access, the repository registry with its
//! lifecycle handlers, proxy fetch-through and group resolution.
//!
//! # Architecture
//!
//! - **ManagedRepositoryContent**: item queries, deployment and deletion
//!   for one managed repository
//! - **RepositoryContentFactory**: maps (type, layout) to content providers
//! - **RepositoryRegistry**: registration, removal, activation and reload of
//!   managed, remote and group repositories, backed by a configuration store
//! - **StorageProxyHandler**: fetches missing files from connected remotes
//! - **GroupContentResolver**: priority ordered member lookup and merged
//!   metadata
//! - **ScanScheduler**: background statistics scans and snapshot cleanup
//!
//! # Example
//!
//! ```rust,no_run
//! use artifact_repo_service::RepositoryServices;
//! use artifact_repo_storage::FileConfigurationStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> artifact_repo_core::Result<()> {
//! let store = Arc::new(FileConfigurationStore::new("/srv/repositories/registry.toml"));
//! let services = RepositoryServices::new(store, "/srv/repositories");
//! services.registry.initialize().await?;
//!
//! let jar = services
//!     .resolver
//!     .resolve("public", "com/example/foo/1.0/foo-1.0.jar")
//!     .await?;
//! let _bytes = jar.read_bytes().await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod content;
pub mod factory;
pub mod group;
pub mod handler;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod remote;
pub mod scanning;
pub mod validation;

// Re-export main types for convenience
pub use audit::{
    current_principal, with_principal, AuditDispatcher, AuditListener, LoggingAuditListener,
    GUEST_PRINCIPAL,
};
pub use content::{
    ArtifactResolution, DeleteStatusCode, DeletionSummary, ItemDeleteStatus, ItemStream,
    ManagedRepositoryContent, RelocatedArtifact,
};
pub use factory::{MavenContentProvider, RepositoryContentFactory, RepositoryContentProvider};
pub use group::{GroupContentResolver, MergedMetadata, ResolvedContent};
pub use handler::{
    HandlerContext, ManagedRepositoryHandler, RemoteRepositoryHandler, RepositoryGroupHandler,
    RepositoryHandler,
};
pub use provider::{MavenRepositoryProvider, RepositoryProvider};
pub use proxy::{NoProxyHandler, RepositoryProxyHandler, StorageProxyHandler};
pub use registry::RepositoryRegistry;
pub use remote::RemoteRepositoryContent;
pub use scanning::{PurgeReport, RepositoryScanner, RepositoryStatistics, ScanScheduler, SnapshotPurge};
pub use validation::{
    DefaultRepositoryChecker, RepositoryChecker, ValidationResult, ValidationWarning,
};

use artifact_repo_storage::{ConfigurationStore, DefaultStorageProvider, StorageProvider};
use std::path::PathBuf;
use std::sync::Arc;

/// All services of one engine instance, wired together
///
/// The registry is not initialized here; call
/// [`RepositoryRegistry::initialize`] once the caller is ready to load the
/// persisted configuration.
#[derive(Clone)]
pub struct RepositoryServices {
    /// Audit event fan-out
    pub audit: Arc<AuditDispatcher>,
    /// Content providers by (type, layout)
    pub content: Arc<RepositoryContentFactory>,
    /// Repository instances and their configuration
    pub registry: Arc<RepositoryRegistry>,
    /// Fetch-through for managed repositories
    pub proxy: Arc<dyn RepositoryProxyHandler>,
    /// Group and managed path resolution
    pub resolver: Arc<GroupContentResolver>,
}

impl RepositoryServices {
    /// Wire the default implementations
    ///
    /// # Arguments
    ///
    /// * `store` - Where the registry configuration is persisted
    /// * `base_dir` - Base directory for relative repository locations
    pub fn new(store: Arc<dyn ConfigurationStore>, base_dir: impl Into<PathBuf>) -> Self {
        Self::with_storage(store, base_dir, Arc::new(DefaultStorageProvider::new()))
    }

    /// Wire the default implementations over a custom storage provider
    pub fn with_storage(
        store: Arc<dyn ConfigurationStore>,
        base_dir: impl Into<PathBuf>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        let audit = Arc::new(AuditDispatcher::new());
        audit.add_listener(Arc::new(LoggingAuditListener));

        let content = Arc::new(RepositoryContentFactory::new(vec![Arc::new(
            MavenContentProvider::new(storage, audit.clone()),
        )]));
        let registry = Arc::new(RepositoryRegistry::new(
            store,
            Arc::new(MavenRepositoryProvider::new(base_dir)),
            content.clone(),
        ));
        let proxy: Arc<dyn RepositoryProxyHandler> =
            Arc::new(StorageProxyHandler::new(registry.clone()));
        let resolver = Arc::new(GroupContentResolver::new(registry.clone(), proxy.clone()));

        Self {
            audit,
            content,
            registry,
            proxy,
            resolver,
        }
    }
}

/// Service layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
