//! Core domain model for the artifact repository engine
//!
//! This crate contains the data structures shared by every layer: item
//! selectors, the content item hierarchy, storage asset handles, repository
//! layouts, metadata documents, repository instances and their persisted
//! configuration records.

pub mod checksum;
pub mod config;
pub mod error;
pub mod event;
pub mod feature;
pub mod item;
pub mod layout;
pub mod metadata;
pub mod repository;
pub mod selector;
pub mod storage;
pub mod types;
pub mod version;

// Re-exports for convenience
pub use checksum::{Checksum, ChecksumAlgorithm, ChecksummingReader};
pub use config::{
    ManagedRepositoryConfig, ProxyConnectorConfig, RegistryConfiguration, RemoteRepositoryConfig,
    RepositoryGroupConfig,
};
pub use error::{RepositoryError, Result, ValidationError};
pub use event::{AuditAction, AuditEvent, RepositoryEvent, RepositoryEventType};
pub use feature::{FeatureKind, FeatureMap, RepositoryFeature};
pub use item::{
    Artifact, ArtifactCoordinates, ArtifactKind, ContentItem, DataItem, DataKind, ItemBase,
    ItemKind, Namespace, Project, Version,
};
pub use layout::{layout_for, LayoutCapability, RepositoryLayout};
pub use metadata::{ArtifactMetadata, Relocation, RelocationKind, METADATA_FILE};
pub use repository::{
    GroupSettings, ManagedSettings, RemoteSettings, Repository, RepositoryCapabilities,
    RepositoryVariant,
};
pub use selector::{Granularity, ItemSelector, SelectorField};
pub use storage::{AssetReader, AssetStat, RepositoryStorage, StorageAsset};
pub use types::{LifecycleState, ReleaseScheme, RepositoryId, RepositoryKind, RepositoryType};
