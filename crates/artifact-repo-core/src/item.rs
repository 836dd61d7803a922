//! Content item model
//!
//! Repository content is a tree of typed nodes: namespaces contain projects,
//! projects contain versions, versions contain artifacts. Every node carries
//! the id of the repository it was resolved against, a handle to its physical
//! asset, the selector it was built from and an attribute bag for
//! layout-specific facets.
//!
//! Items are plain values. Building one never touches storage; physical
//! presence is queried separately through [`ContentItem::exists`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::checksum::ChecksumAlgorithm;
use crate::error::Result;
use crate::selector::ItemSelector;
use crate::storage::StorageAsset;
use crate::types::RepositoryId;

/// Variant tag of a [`ContentItem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Namespace,
    Project,
    Version,
    Artifact,
    Data,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Namespace => "namespace",
            ItemKind::Project => "project",
            ItemKind::Version => "version",
            ItemKind::Artifact => "artifact",
            ItemKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// State shared by every item variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBase {
    /// Owning repository (back-reference by id)
    pub repository: RepositoryId,
    /// Physical location
    pub asset: StorageAsset,
    /// Coordinates the item was resolved from
    pub selector: ItemSelector,
    /// Layout-specific facets
    pub attributes: BTreeMap<String, String>,
}

impl ItemBase {
    pub fn new(repository: RepositoryId, asset: StorageAsset, selector: ItemSelector) -> Self {
        Self {
            repository,
            asset,
            selector,
            attributes: BTreeMap::new(),
        }
    }
}

/// A dotted grouping id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub base: ItemBase,
    pub namespace: String,
}

/// Namespace + project id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub base: ItemBase,
    pub namespace: String,
    pub project_id: String,
}

/// A project version; owns the version-level metadata item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub base: ItemBase,
    pub namespace: String,
    pub project_id: String,
    pub version: String,
    pub metadata: DataItem,
}

impl Version {
    pub fn is_snapshot(&self) -> bool {
        crate::version::is_snapshot(&self.version)
    }
}

/// Full artifact coordinate. An empty classifier means none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCoordinates {
    pub namespace: String,
    pub project_id: String,
    /// Directory version (`1.0-SNAPSHOT` for timestamped builds)
    pub version: String,
    pub artifact_id: String,
    /// File version (may be a timestamped snapshot build)
    pub artifact_version: String,
    pub classifier: String,
    pub extension: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
}

impl ArtifactCoordinates {
    pub fn has_classifier(&self) -> bool {
        !self.classifier.is_empty()
    }

    /// Selector addressing exactly this artifact
    pub fn to_selector(&self) -> ItemSelector {
        ItemSelector::builder()
            .namespace(&self.namespace)
            .project_id(&self.project_id)
            .version(&self.version)
            .artifact_id(&self.artifact_id)
            .artifact_version(&self.artifact_version)
            .classifier(&self.classifier)
            .extension(&self.extension)
            .artifact_type(&self.artifact_type)
            .build()
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.namespace, self.artifact_id, self.artifact_version
        )?;
        if self.has_classifier() {
            write!(f, ":{}", self.classifier)?;
        }
        write!(f, ":{}", self.extension)
    }
}

/// Role of an artifact file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Primary or attached (classified) artifact
    Main,
    /// Checksum companion of another artifact
    Checksum,
    /// Detached signature
    Signature,
}

impl ArtifactKind {
    /// Classify by file extension
    pub fn from_extension(extension: &str) -> Self {
        let last = extension.rsplit('.').next().unwrap_or(extension);
        if crate::checksum::is_checksum_extension(last) {
            ArtifactKind::Checksum
        } else if last == "asc" {
            ArtifactKind::Signature
        } else {
            ArtifactKind::Main
        }
    }
}

/// A single artifact file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub base: ItemBase,
    pub coordinates: ArtifactCoordinates,
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Physical presence; independent of coordinate validity
    pub async fn exists(&self) -> Result<bool> {
        self.base.asset.is_leaf().await
    }

    pub fn is_snapshot(&self) -> bool {
        crate::version::is_snapshot(&self.coordinates.artifact_version)
    }

    pub fn file_name(&self) -> &str {
        self.base.asset.name()
    }
}

/// Kind of a non-artifact file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Metadata,
    Checksum(ChecksumAlgorithm),
    Other,
}

/// Generic file such as a metadata document or checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    pub base: ItemBase,
    pub kind: DataKind,
}

impl DataItem {
    pub async fn exists(&self) -> Result<bool> {
        self.base.asset.is_leaf().await
    }
}

/// A typed node in the logical repository tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Namespace(Namespace),
    Project(Project),
    Version(Version),
    Artifact(Artifact),
    Data(DataItem),
}

impl ContentItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            ContentItem::Namespace(_) => ItemKind::Namespace,
            ContentItem::Project(_) => ItemKind::Project,
            ContentItem::Version(_) => ItemKind::Version,
            ContentItem::Artifact(_) => ItemKind::Artifact,
            ContentItem::Data(_) => ItemKind::Data,
        }
    }

    pub fn base(&self) -> &ItemBase {
        match self {
            ContentItem::Namespace(i) => &i.base,
            ContentItem::Project(i) => &i.base,
            ContentItem::Version(i) => &i.base,
            ContentItem::Artifact(i) => &i.base,
            ContentItem::Data(i) => &i.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ItemBase {
        match self {
            ContentItem::Namespace(i) => &mut i.base,
            ContentItem::Project(i) => &mut i.base,
            ContentItem::Version(i) => &mut i.base,
            ContentItem::Artifact(i) => &mut i.base,
            ContentItem::Data(i) => &mut i.base,
        }
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.base().repository
    }

    pub fn asset(&self) -> &StorageAsset {
        &self.base().asset
    }

    pub fn selector(&self) -> &ItemSelector {
        &self.base().selector
    }

    pub fn path(&self) -> &str {
        self.asset().path()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.base().attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.base_mut().attributes.insert(key.into(), value.into());
    }

    /// Physical presence of the backing asset
    pub async fn exists(&self) -> Result<bool> {
        self.asset().exists().await
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            ContentItem::Namespace(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        match self {
            ContentItem::Project(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            ContentItem::Version(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            ContentItem::Artifact(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataItem> {
        match self {
            ContentItem::Data(i) => Some(i),
            _ => None,
        }
    }

    pub fn into_artifact(self) -> Option<Artifact> {
        match self {
            ContentItem::Artifact(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for ContentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.kind(), self.repository(), self.path())
    }
}

impl From<Namespace> for ContentItem {
    fn from(item: Namespace) -> Self {
        ContentItem::Namespace(item)
    }
}

impl From<Project> for ContentItem {
    fn from(item: Project) -> Self {
        ContentItem::Project(item)
    }
}

impl From<Version> for ContentItem {
    fn from(item: Version) -> Self {
        ContentItem::Version(item)
    }
}

impl From<Artifact> for ContentItem {
    fn from(item: Artifact) -> Self {
        ContentItem::Artifact(item)
    }
}

impl From<DataItem> for ContentItem {
    fn from(item: DataItem) -> Self {
        ContentItem::Data(item)
    }
}
