//! Pure construction of content items
//!
//! Nothing in here touches storage: items are assembled from a selector, the
//! repository layout and the repository root asset.

use artifact_repo_core::checksum::{is_checksum_extension, ChecksumAlgorithm};
use artifact_repo_core::layout::RepositoryLayout;
use artifact_repo_core::metadata::{is_metadata_path, METADATA_FILE};
use artifact_repo_core::selector::SelectorField;
use artifact_repo_core::version::{self, SnapshotBuild};
use artifact_repo_core::{
    Artifact, ArtifactCoordinates, ArtifactKind, ContentItem, DataItem, DataKind, ItemBase,
    ItemKind, ItemSelector, Namespace, Project, RepositoryId, Result, StorageAsset, Version,
};
use std::sync::Arc;

/// Attribute holding the timestamp of a snapshot build
pub const SNAPSHOT_TIMESTAMP_ATTRIBUTE: &str = "snapshot.timestamp";
/// Attribute holding the build number of a snapshot build
pub const SNAPSHOT_BUILD_ATTRIBUTE: &str = "snapshot.buildNumber";

#[derive(Debug, Clone)]
pub(crate) struct ItemFactory {
    repository: RepositoryId,
    layout: Arc<dyn RepositoryLayout>,
    root: StorageAsset,
}

impl ItemFactory {
    pub(crate) fn new(
        repository: RepositoryId,
        layout: Arc<dyn RepositoryLayout>,
        root: StorageAsset,
    ) -> Self {
        Self {
            repository,
            layout,
            root,
        }
    }

    pub(crate) fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    pub(crate) fn layout(&self) -> &Arc<dyn RepositoryLayout> {
        &self.layout
    }

    pub(crate) fn root(&self) -> &StorageAsset {
        &self.root
    }

    fn base(&self, path: &str, selector: ItemSelector) -> Result<ItemBase> {
        Ok(ItemBase::new(
            self.repository.clone(),
            self.root.resolve(path)?,
            selector,
        ))
    }

    pub(crate) fn namespace(&self, selector: &ItemSelector) -> Result<Namespace> {
        selector.require(&[SelectorField::Namespace], "getNamespace")?;
        let path = self.layout.namespace_path(selector)?;
        let namespace = selector.namespace().unwrap_or_default().to_string();
        let snapshot = ItemSelector::builder().namespace(&namespace).build();
        Ok(Namespace {
            base: self.base(&path, snapshot)?,
            namespace,
        })
    }

    pub(crate) fn project(&self, selector: &ItemSelector) -> Result<Project> {
        selector.require(
            &[SelectorField::Namespace, SelectorField::ProjectId],
            "getProject",
        )?;
        let path = self.layout.project_path(selector)?;
        let namespace = selector.namespace().unwrap_or_default().to_string();
        let project_id = selector.project_id().unwrap_or_default().to_string();
        let snapshot = ItemSelector::builder()
            .namespace(&namespace)
            .project_id(&project_id)
            .build();
        Ok(Project {
            base: self.base(&path, snapshot)?,
            namespace,
            project_id,
        })
    }

    pub(crate) fn version(&self, selector: &ItemSelector) -> Result<Version> {
        selector.require(
            &[
                SelectorField::Namespace,
                SelectorField::ProjectId,
                SelectorField::Version,
            ],
            "getVersion",
        )?;
        let path = self.layout.version_path(selector)?;
        let namespace = selector.namespace().unwrap_or_default().to_string();
        let project_id = selector.project_id().unwrap_or_default().to_string();
        let version = version::base_version(selector.version().unwrap_or_default());
        let snapshot = ItemSelector::builder()
            .namespace(&namespace)
            .project_id(&project_id)
            .version(&version)
            .build();
        let metadata_path = self.layout.metadata_path(&snapshot)?;
        let metadata = self.data(&metadata_path, DataKind::Metadata)?;
        Ok(Version {
            base: self.base(&path, snapshot)?,
            namespace,
            project_id,
            version,
            metadata,
        })
    }

    pub(crate) fn artifact(&self, selector: &ItemSelector) -> Result<Artifact> {
        selector.require(&[SelectorField::Namespace], "getArtifact")?;
        let coordinates = self.layout.artifact_coordinates(selector)?;
        self.artifact_from(coordinates)
    }

    pub(crate) fn artifact_from(&self, coordinates: ArtifactCoordinates) -> Result<Artifact> {
        let path = self.layout.coordinates_path(&coordinates)?;
        let mut base = self.base(&path, coordinates.to_selector())?;
        if let Some(build) = SnapshotBuild::parse(&coordinates.artifact_version) {
            base.attributes
                .insert(SNAPSHOT_TIMESTAMP_ATTRIBUTE.to_string(), build.timestamp.clone());
            base.attributes.insert(
                SNAPSHOT_BUILD_ATTRIBUTE.to_string(),
                build.build_number.to_string(),
            );
        }
        Ok(Artifact {
            kind: ArtifactKind::from_extension(&coordinates.extension),
            base,
            coordinates,
        })
    }

    pub(crate) fn data(&self, path: &str, kind: DataKind) -> Result<DataItem> {
        let base = self.base(path, ItemSelector::empty())?;
        Ok(DataItem { base, kind })
    }

    /// Item for the selector's most specific coordinates
    pub(crate) fn item(&self, selector: &ItemSelector) -> Result<ContentItem> {
        use artifact_repo_core::Granularity;
        match selector.granularity() {
            Granularity::None => Err(artifact_repo_core::RepositoryError::InvalidArgument(
                "getItem requires at least a namespace".to_string(),
            )),
            Granularity::Namespace => Ok(self.namespace(selector)?.into()),
            Granularity::Project => Ok(self.project(selector)?.into()),
            Granularity::Version => Ok(self.version(selector)?.into()),
            Granularity::Artifact => Ok(self.artifact(selector)?.into()),
        }
    }

    /// Interpret a container path as the given item kind
    pub(crate) fn container(&self, path: &str, kind: ItemKind) -> Result<ContentItem> {
        let selector = self.layout.container_selector(path, kind)?;
        match kind {
            ItemKind::Project => Ok(self.project(&selector)?.into()),
            ItemKind::Version => Ok(self.version(&selector)?.into()),
            _ => Ok(self.namespace(&selector)?.into()),
        }
    }

    /// Parse an artifact file path; `None` for anything that is not one
    pub(crate) fn parse_artifact(&self, path: &str) -> Option<Artifact> {
        if is_metadata_path(path) || is_hidden(path) {
            return None;
        }
        let selector = self.layout.to_item_selector(path).ok()?;
        let coordinates = self.layout.artifact_coordinates(&selector).ok()?;
        let artifact = self.artifact_from(coordinates).ok()?;
        // Only accept paths the layout maps back to themselves
        (artifact.base.asset.path() == path).then_some(artifact)
    }

    /// Item for a file: artifact, metadata document or checksum
    pub(crate) fn leaf(&self, path: &str) -> Result<ContentItem> {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name == METADATA_FILE {
            return Ok(self.data(path, DataKind::Metadata)?.into());
        }
        if let Some(artifact) = self.parse_artifact(path) {
            if artifact.kind != ArtifactKind::Checksum {
                return Ok(artifact.into());
            }
        }
        Ok(self.data(path, data_kind(name))?.into())
    }
}

fn data_kind(name: &str) -> DataKind {
    match name.rsplit_once('.') {
        Some((_, ext)) if is_checksum_extension(ext) => ChecksumAlgorithm::from_extension(ext)
            .map(DataKind::Checksum)
            .unwrap_or(DataKind::Other),
        _ => DataKind::Other,
    }
}

/// Dot-prefixed entries hold index data and are not repository content
pub(crate) fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}
