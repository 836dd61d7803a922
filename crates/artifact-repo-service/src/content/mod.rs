//! Content access for managed repositories
//!
//! [`ManagedRepositoryContent`] binds a repository layout to a storage root.
//! Item construction (`get_namespace`, `get_version`, ...) is pure and
//! validates the selector before anything else; queries and mutations go
//! to storage. Mutations require the content to be attached to an active
//! repository instance.

mod delete;
mod deploy;
mod items;
mod stream;

pub use delete::{DeleteStatusCode, DeletionSummary, ItemDeleteStatus};
pub use items::{SNAPSHOT_BUILD_ATTRIBUTE, SNAPSHOT_TIMESTAMP_ATTRIBUTE};
pub use stream::ItemStream;

pub(crate) use items::ItemFactory;
pub(crate) use stream::ItemWalker;

use artifact_repo_core::version::{self, compare_versions};
use artifact_repo_core::{
    Artifact, ArtifactMetadata, ContentItem, DataKind, Granularity, ItemKind, ItemSelector,
    LayoutCapability, Namespace, Project, RelocationKind, Repository, RepositoryError,
    RepositoryId, RepositoryLayout, RepositoryStorage, Result, StorageAsset, Version,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::audit::AuditDispatcher;
use items::is_hidden;

/// Outcome of resolving an artifact request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactResolution {
    /// The artifact to serve; it may or may not exist physically
    Found(Artifact),
    /// Version metadata redirects the request
    Relocated(RelocatedArtifact),
}

/// A relocation hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedArtifact {
    pub source: Artifact,
    pub target: ItemSelector,
    pub target_path: String,
    pub kind: RelocationKind,
    pub message: Option<String>,
}

/// Layout-aware content of one managed repository
pub struct ManagedRepositoryContent {
    id: RepositoryId,
    items: ItemFactory,
    repository: RwLock<Option<Arc<Repository>>>,
    audit: Arc<AuditDispatcher>,
}

impl std::fmt::Debug for ManagedRepositoryContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedRepositoryContent")
            .field("id", &self.id)
            .field("layout", &self.items.layout().id())
            .field("storage", &self.items.root().storage().id())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ManagedRepositoryContent {
    pub fn new(
        repository: Arc<Repository>,
        layout: Arc<dyn RepositoryLayout>,
        storage: Arc<dyn RepositoryStorage>,
        audit: Arc<AuditDispatcher>,
    ) -> Self {
        let id = repository.id().clone();
        Self {
            items: ItemFactory::new(id.clone(), layout, StorageAsset::root(storage)),
            id,
            repository: RwLock::new(Some(repository)),
            audit,
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn layout(&self) -> &Arc<dyn RepositoryLayout> {
        self.items.layout()
    }

    /// Storage root of the repository
    pub fn root(&self) -> &StorageAsset {
        self.items.root()
    }

    /// The repository instance this content belongs to, if still attached
    pub fn repository(&self) -> Option<Arc<Repository>> {
        self.repository.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.repository.read().is_some()
    }

    /// Attach to a (new) repository instance, or detach with `None`.
    /// Detached content keeps serving reads but refuses writes.
    pub fn set_repository(&self, repository: Option<Arc<Repository>>) -> Result<()> {
        if let Some(repository) = &repository {
            if repository.id() != &self.id {
                return Err(RepositoryError::InvalidArgument(format!(
                    "Cannot attach repository '{}' to content of '{}'",
                    repository.id(),
                    self.id
                )));
            }
        }
        *self.repository.write() = repository;
        Ok(())
    }

    /// Drop the repository reference; later writes fail
    pub fn detach(&self) {
        *self.repository.write() = None;
    }

    /// The attached repository, which must be active
    pub(crate) fn active_repository(&self) -> Result<Arc<Repository>> {
        let repository = self.repository().ok_or_else(|| {
            RepositoryError::InvalidState(format!(
                "Content of '{}' is detached from its repository",
                self.id
            ))
        })?;
        if !repository.is_active() {
            return Err(RepositoryError::InvalidState(format!(
                "Repository '{}' is {}",
                self.id,
                repository.state()
            )));
        }
        Ok(repository)
    }

    pub(crate) fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    pub(crate) fn items(&self) -> &ItemFactory {
        &self.items
    }

    pub(crate) fn storage_error(&self, error: RepositoryError) -> RepositoryError {
        error.with_repository(self.id.as_str())
    }

    /// Asset at a repository relative path
    pub fn asset(&self, path: &str) -> Result<StorageAsset> {
        self.items.root().resolve(path)
    }

    // Pure item construction

    pub fn get_namespace(&self, selector: &ItemSelector) -> Result<Namespace> {
        self.items.namespace(selector)
    }

    pub fn get_project(&self, selector: &ItemSelector) -> Result<Project> {
        self.items.project(selector)
    }

    pub fn get_version(&self, selector: &ItemSelector) -> Result<Version> {
        self.items.version(selector)
    }

    pub fn get_artifact(&self, selector: &ItemSelector) -> Result<Artifact> {
        self.items.artifact(selector)
    }

    /// Item at the selector's most specific level
    pub fn get_item(&self, selector: &ItemSelector) -> Result<ContentItem> {
        self.items.item(selector)
    }

    // Queries

    /// Whether at least one artifact matches. Missing containers count as
    /// no content; storage failures are returned.
    #[instrument(skip(self), fields(repository = %self.id))]
    pub async fn has_content(&self, selector: &ItemSelector) -> Result<bool> {
        require_coordinates(selector, "hasContent")?;
        let mut walker = ItemWalker::artifacts(self.items.clone(), selector.clone())?;
        let found = walker
            .next_item()
            .await
            .map_err(|e| self.storage_error(e))?;
        Ok(found.is_some())
    }

    /// Main artifacts matching the selector
    pub async fn get_artifacts(&self, selector: &ItemSelector) -> Result<Vec<Artifact>> {
        require_coordinates(selector, "getArtifacts")?;
        let walker = ItemWalker::artifacts(self.items.clone(), selector.clone())?;
        let items = ItemStream::sequential(walker)
            .collect_items()
            .await
            .map_err(|e| self.storage_error(e))?;
        Ok(items.into_iter().filter_map(ContentItem::into_artifact).collect())
    }

    /// Artifacts sharing the selected artifact's id and version, e.g. the
    /// POM, sources and javadoc next to a JAR
    pub async fn get_related_artifacts(&self, selector: &ItemSelector) -> Result<Vec<Artifact>> {
        let artifact = self.items.artifact(selector)?;
        self.layout().require(LayoutCapability::RelatedArtifacts)?;
        let c = &artifact.coordinates;
        let related = ItemSelector::builder()
            .namespace(&c.namespace)
            .project_id(&c.project_id)
            .version(&c.version)
            .artifact_id(&c.artifact_id)
            .artifact_version(&c.artifact_version)
            .build();
        self.get_artifacts(&related).await
    }

    /// Projects below a namespace (and its sub-namespaces with `recurse`)
    pub async fn get_projects(&self, selector: &ItemSelector) -> Result<Vec<Project>> {
        let namespace = self.items.namespace(selector)?;
        self.layout().require(LayoutCapability::VersionContainers)?;
        let walk = ItemSelector::builder()
            .namespace(&namespace.namespace)
            .recurse(selector.recurse())
            .build();
        let projects = self
            .collect(&walk)
            .await?
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Project(p) => Some(p),
                _ => None,
            })
            .collect();
        Ok(projects)
    }

    /// Versions of a project, oldest first
    pub async fn get_versions(&self, selector: &ItemSelector) -> Result<Vec<Version>> {
        let project = self.items.project(selector)?;
        self.layout().require(LayoutCapability::VersionContainers)?;
        let walk = ItemSelector::builder()
            .namespace(&project.namespace)
            .project_id(&project.project_id)
            .build();
        let mut versions: Vec<Version> = self
            .collect(&walk)
            .await?
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Version(v) => Some(v),
                _ => None,
            })
            .collect();
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }

    /// Distinct file versions (including snapshot builds) of a project or
    /// version, oldest first
    pub async fn get_artifact_versions(&self, selector: &ItemSelector) -> Result<Vec<String>> {
        let project = self.items.project(selector)?;
        let mut walk = ItemSelector::builder()
            .namespace(&project.namespace)
            .project_id(&project.project_id);
        if let Some(version) = selector.version() {
            walk = walk.version(version);
        }
        let versions: BTreeSet<String> = self
            .get_artifacts(&walk.build())
            .await?
            .into_iter()
            .map(|a| a.coordinates.artifact_version)
            .collect();
        let mut versions: Vec<String> = versions.into_iter().collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Direct children of a container item
    pub async fn get_children(&self, item: &ContentItem) -> Result<Vec<ContentItem>> {
        if matches!(item, ContentItem::Artifact(_) | ContentItem::Data(_)) {
            return Ok(Vec::new());
        }
        let mut children = Vec::new();
        let entries = item.asset().list().await.map_err(|e| self.storage_error(e))?;
        for entry in entries {
            if is_hidden(entry.name()) {
                continue;
            }
            let Some(stat) = entry.stat().await.map_err(|e| self.storage_error(e))? else {
                continue;
            };
            if !stat.container {
                children.push(self.items.leaf(entry.path())?);
                continue;
            }
            let kind = match item {
                ContentItem::Project(_) => Some(ItemKind::Version),
                _ => self.classify_container(&entry).await?,
            };
            match kind {
                Some(kind) => children.push(self.items.container(entry.path(), kind)?),
                None => {
                    // Legacy type directory: its artifacts belong to the namespace
                    for leaf in entry.list().await.map_err(|e| self.storage_error(e))? {
                        if let Some(artifact) = self.items.parse_artifact(leaf.path()) {
                            children.push(artifact.into());
                        }
                    }
                }
            }
        }
        Ok(children)
    }

    /// Logical parent of an item; `None` at the top of the tree
    pub async fn get_parent(&self, item: &ContentItem) -> Result<Option<ContentItem>> {
        let versioned = self.layout().supports(LayoutCapability::VersionContainers);
        let parent = match item {
            ContentItem::Artifact(a) => {
                let c = &a.coordinates;
                let namespace = ItemSelector::builder().namespace(&c.namespace).build();
                if versioned {
                    let version = namespace
                        .to_builder()
                        .project_id(&c.project_id)
                        .version(&c.version)
                        .build();
                    Some(self.items.version(&version)?.into())
                } else {
                    Some(self.items.namespace(&namespace)?.into())
                }
            }
            ContentItem::Version(v) => {
                let project = ItemSelector::builder()
                    .namespace(&v.namespace)
                    .project_id(&v.project_id)
                    .build();
                Some(self.items.project(&project)?.into())
            }
            ContentItem::Project(p) => {
                let namespace = ItemSelector::builder().namespace(&p.namespace).build();
                Some(self.items.namespace(&namespace)?.into())
            }
            ContentItem::Namespace(ns) => match ns.namespace.rsplit_once('.') {
                Some((parent, _)) if versioned => {
                    let namespace = ItemSelector::builder().namespace(parent).build();
                    Some(self.items.namespace(&namespace)?.into())
                }
                _ => None,
            },
            ContentItem::Data(d) => match d.base.asset.parent() {
                Some(parent) if !parent.is_root() => Some(self.to_item(parent.path()).await?),
                _ => None,
            },
        };
        Ok(parent)
    }

    /// Classify a repository path into an item
    #[instrument(skip(self), fields(repository = %self.id))]
    pub async fn to_item(&self, path: &str) -> Result<ContentItem> {
        let asset = self.asset(path)?;
        if asset.is_root() {
            return Err(RepositoryError::InvalidArgument(
                "The repository root is not an item".to_string(),
            ));
        }
        match asset.stat().await.map_err(|e| self.storage_error(e))? {
            Some(stat) if stat.container => match self.classify_container(&asset).await? {
                Some(kind) => self.items.container(asset.path(), kind),
                None => Err(RepositoryError::Layout(format!(
                    "'{}' is not an item in the '{}' layout",
                    asset.path(),
                    self.layout().id()
                ))),
            },
            Some(_) => self.items.leaf(asset.path()),
            None => match self.items.parse_artifact(asset.path()) {
                Some(artifact) => Ok(artifact.into()),
                None => Err(RepositoryError::ItemNotFound(format!(
                    "'{}' in repository '{}'",
                    asset.path(),
                    self.id
                ))),
            },
        }
    }

    /// Selector for an artifact path
    pub fn to_item_selector(&self, path: &str) -> Result<ItemSelector> {
        let asset = self.asset(path)?;
        self.layout().to_item_selector(asset.path())
    }

    /// Metadata document at the selector's level, if present
    pub async fn find_metadata(&self, selector: &ItemSelector) -> Result<Option<ArtifactMetadata>> {
        let path = self.layout().metadata_path(selector)?;
        let asset = self.asset(&path)?;
        match asset.read_bytes().await {
            Ok(data) => Ok(Some(ArtifactMetadata::parse(&data)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    pub async fn get_metadata(&self, selector: &ItemSelector) -> Result<ArtifactMetadata> {
        self.find_metadata(selector).await?.ok_or_else(|| {
            RepositoryError::ContentNotFound(format!("Metadata for '{}' in '{}'", selector, self.id))
        })
    }

    /// Resolve an artifact request: follow relocations and map generic
    /// snapshot requests to the latest deployed build
    #[instrument(skip(self), fields(repository = %self.id))]
    pub async fn resolve_artifact(&self, selector: &ItemSelector) -> Result<ArtifactResolution> {
        let artifact = self.items.artifact(selector)?;
        if !self.layout().supports(LayoutCapability::VersionContainers) {
            return Ok(ArtifactResolution::Found(artifact));
        }
        let c = artifact.coordinates.clone();
        let version_selector = ItemSelector::builder()
            .namespace(&c.namespace)
            .project_id(&c.project_id)
            .version(&c.version)
            .build();
        let Some(metadata) = self.find_metadata(&version_selector).await? else {
            return Ok(ArtifactResolution::Found(artifact));
        };

        if let Some(relocation) = &metadata.relocation {
            let target = relocation.target_selector(&c);
            let target_path = self.layout().artifact_path(&target)?;
            debug!(from = %c, to = %target_path, "Artifact relocated");
            return Ok(ArtifactResolution::Relocated(RelocatedArtifact {
                source: artifact,
                target,
                target_path,
                kind: relocation.kind,
                message: relocation.message.clone(),
            }));
        }

        if version::is_generic_snapshot(&c.artifact_version)
            && self.layout().supports(LayoutCapability::SnapshotTimestamps)
        {
            if let Some(build) = metadata.snapshot_artifact_version(&c.classifier, &c.extension) {
                let mut coordinates = c;
                coordinates.artifact_version = build;
                return Ok(ArtifactResolution::Found(self.items.artifact_from(coordinates)?));
            }
        }
        Ok(ArtifactResolution::Found(artifact))
    }

    /// Reinterpret an item as another kind, when the layout allows it
    pub fn characteristic(&self, item: &ContentItem, kind: ItemKind) -> Option<ContentItem> {
        if item.kind() == kind {
            return Some(item.clone());
        }
        match (item, kind) {
            (ContentItem::Data(d), ItemKind::Artifact) => {
                self.items.parse_artifact(d.base.asset.path()).map(Into::into)
            }
            (ContentItem::Artifact(a), ItemKind::Data) => {
                let data_kind = match a.kind {
                    artifact_repo_core::ArtifactKind::Checksum => a
                        .coordinates
                        .extension
                        .rsplit('.')
                        .next()
                        .and_then(artifact_repo_core::ChecksumAlgorithm::from_extension)
                        .map(DataKind::Checksum)
                        .unwrap_or(DataKind::Other),
                    _ => DataKind::Other,
                };
                self.items.data(a.base.asset.path(), data_kind).ok().map(Into::into)
            }
            (
                ContentItem::Namespace(_) | ContentItem::Project(_) | ContentItem::Version(_),
                ItemKind::Namespace | ItemKind::Project | ItemKind::Version,
            ) => self.items.container(item.path(), kind).ok(),
            _ => None,
        }
    }

    /// Stream of the items matching the selector. An empty selector walks
    /// the whole repository. With `parallel` the walk runs ahead on a
    /// separate task.
    pub fn new_item_stream(&self, selector: &ItemSelector, parallel: bool) -> Result<ItemStream> {
        let walker = ItemWalker::new(self.items.clone(), selector.clone())?;
        Ok(if parallel {
            ItemStream::parallel(walker)
        } else {
            ItemStream::sequential(walker)
        })
    }

    /// Feed matching items to `visitor` until it breaks or the walk ends.
    /// Returns the number of visited items; the stream is always closed.
    pub async fn visit_items<F>(&self, selector: &ItemSelector, mut visitor: F) -> Result<usize>
    where
        F: FnMut(ContentItem) -> ControlFlow<()> + Send,
    {
        let mut stream = self.new_item_stream(selector, false)?;
        let mut visited = 0;
        let result = loop {
            match stream.next_item().await {
                Some(Ok(item)) => {
                    visited += 1;
                    if visitor(item).is_break() {
                        break Ok(visited);
                    }
                }
                Some(Err(e)) => break Err(self.storage_error(e)),
                None => break Ok(visited),
            }
        };
        stream.close();
        result
    }

    async fn collect(&self, selector: &ItemSelector) -> Result<Vec<ContentItem>> {
        self.new_item_stream(selector, false)?
            .collect_items()
            .await
            .map_err(|e| self.storage_error(e))
    }

    /// Decide what a container holds. `None` for containers that are not
    /// items in this layout.
    async fn classify_container(&self, asset: &StorageAsset) -> Result<Option<ItemKind>> {
        let path = asset.path();
        if path.is_empty() {
            return Ok(None);
        }
        if !self.layout().supports(LayoutCapability::VersionContainers) {
            return Ok((!path.contains('/')).then_some(ItemKind::Namespace));
        }
        let children = asset.list().await.map_err(|e| self.storage_error(e))?;
        if self.holds_artifacts(&children) {
            return Ok(Some(ItemKind::Version));
        }
        for child in children.iter().filter(|c| !is_hidden(c.name())) {
            if !child.is_container().await.map_err(|e| self.storage_error(e))? {
                continue;
            }
            let grandchildren = child.list().await.map_err(|e| self.storage_error(e))?;
            if self.holds_artifacts(&grandchildren) {
                return Ok(Some(ItemKind::Project));
            }
        }
        Ok(Some(ItemKind::Namespace))
    }

    fn holds_artifacts(&self, assets: &[StorageAsset]) -> bool {
        assets
            .iter()
            .any(|a| self.items.parse_artifact(a.path()).is_some())
    }
}

/// Queries need at least one coordinate
fn require_coordinates(selector: &ItemSelector, operation: &str) -> Result<()> {
    if selector.granularity() == Granularity::None {
        return Err(RepositoryError::InvalidArgument(format!(
            "{} requires a selector with coordinates",
            operation
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use artifact_repo_core::{
        layout_for, LifecycleState, ManagedSettings, ReleaseScheme, RepositoryCapabilities,
        RepositoryType, RepositoryVariant,
    };
    use artifact_repo_storage::MemoryStorage;
    use url::Url;

    pub(crate) fn repository(id: &str, layout: &str, snapshots: bool, block: bool) -> Arc<Repository> {
        let mut capabilities = RepositoryCapabilities::new(RepositoryType::Maven, layout);
        capabilities.release_schemes.insert(ReleaseScheme::Release);
        if snapshots {
            capabilities.release_schemes.insert(ReleaseScheme::Snapshot);
        }
        let repository = Repository::new(
            RepositoryId::new(id).unwrap(),
            id,
            Url::parse(&format!("mem:{}", id)).unwrap(),
            capabilities,
            RepositoryVariant::Managed(ManagedSettings {
                block_redeployments: block,
                scan_interval: None,
                failover_locations: Vec::new(),
            }),
        );
        repository.transition(LifecycleState::Registered).unwrap();
        repository.transition(LifecycleState::Activated).unwrap();
        Arc::new(repository)
    }

    pub(crate) fn content(layout: &str) -> ManagedRepositoryContent {
        ManagedRepositoryContent::new(
            repository("internal", layout, true, true),
            layout_for(layout).unwrap(),
            Arc::new(MemoryStorage::new("mem:internal")),
            Arc::new(AuditDispatcher::new()),
        )
    }

    pub(crate) async fn seed(content: &ManagedRepositoryContent, paths: &[&str]) {
        for path in paths {
            content.asset(path).unwrap().write_bytes(b"data").await.unwrap();
        }
    }

    fn selector(ns: &str, project: &str, version: &str) -> ItemSelector {
        ItemSelector::builder()
            .namespace(ns)
            .project_id(project)
            .version(version)
            .build()
    }

    #[tokio::test]
    async fn test_has_content() {
        let content = content("default");
        seed(&content, &["com/example/foo/1.0/foo-1.0.jar"]).await;
        assert!(content.has_content(&selector("com.example", "foo", "1.0")).await.unwrap());
        assert!(!content.has_content(&selector("com.example", "foo", "2.0")).await.unwrap());
        assert!(content
            .has_content(&ItemSelector::empty())
            .await
            .unwrap_err()
            .is_invalid_argument());
    }

    #[tokio::test]
    async fn test_versions_sorted() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.10/foo-1.10.jar",
                "com/example/foo/1.2/foo-1.2.jar",
                "com/example/foo/1.2-SNAPSHOT/foo-1.2-SNAPSHOT.jar",
            ],
        )
        .await;
        let versions: Vec<String> = content
            .get_versions(&ItemSelector::builder().namespace("com.example").project_id("foo").build())
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec!["1.2-SNAPSHOT", "1.2", "1.10"]);
    }

    #[tokio::test]
    async fn test_projects_and_related_artifacts() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.0/foo-1.0.jar",
                "com/example/foo/1.0/foo-1.0.pom",
                "com/example/foo/1.0/foo-1.0-sources.jar",
                "com/example/bar/2.0/bar-2.0.jar",
            ],
        )
        .await;
        let projects: Vec<String> = content
            .get_projects(&ItemSelector::builder().namespace("com.example").build())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.project_id)
            .collect();
        assert_eq!(projects, vec!["bar", "foo"]);

        let jar = selector("com.example", "foo", "1.0").to_builder().extension("jar").build();
        let related = content.get_related_artifacts(&jar).await.unwrap();
        assert_eq!(related.len(), 3);
    }

    #[tokio::test]
    async fn test_legacy_rejects_project_queries() {
        let content = content("legacy");
        seed(&content, &["com.example/jars/foo-1.0.jar"]).await;
        let err = content
            .get_projects(&ItemSelector::builder().namespace("com.example").build())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Layout(_)));
        let jar = selector("com.example", "foo", "1.0");
        assert!(matches!(
            content.get_related_artifacts(&jar).await.unwrap_err(),
            RepositoryError::Layout(_)
        ));
        assert_eq!(content.get_artifacts(&jar).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_to_item_classification() {
        let content = content("default");
        seed(
            &content,
            &["com/example/foo/1.0/foo-1.0.jar", "com/example/foo/artifact-metadata.json"],
        )
        .await;
        assert_eq!(content.to_item("com/example/foo/1.0").await.unwrap().kind(), ItemKind::Version);
        assert_eq!(content.to_item("com/example/foo").await.unwrap().kind(), ItemKind::Project);
        assert_eq!(content.to_item("com/example").await.unwrap().kind(), ItemKind::Namespace);
        assert_eq!(
            content.to_item("com/example/foo/artifact-metadata.json").await.unwrap().kind(),
            ItemKind::Data
        );
        // Absent but well-formed artifacts are still items
        let missing = content.to_item("com/example/foo/2.0/foo-2.0.jar").await.unwrap();
        assert!(!missing.exists().await.unwrap());
        assert!(content.to_item("com/example/nothing").await.unwrap_err().is_not_found());
        assert!(content.to_item("../etc").await.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_children_and_parent() {
        let content = content("default");
        seed(
            &content,
            &["com/example/foo/1.0/foo-1.0.jar", "com/example/foo/1.0/foo-1.0.jar.sha256"],
        )
        .await;
        let version: ContentItem = content
            .get_version(&selector("com.example", "foo", "1.0"))
            .unwrap()
            .into();
        let children = content.get_children(&version).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].kind(), ItemKind::Artifact);
        assert_eq!(children[1].kind(), ItemKind::Data);

        let parent = content.get_parent(&children[0]).await.unwrap().unwrap();
        assert_eq!(parent, version);
        let project = content.get_parent(&version).await.unwrap().unwrap();
        assert_eq!(project.kind(), ItemKind::Project);
        let namespace = content.get_parent(&project).await.unwrap().unwrap();
        let top = content.get_parent(&namespace).await.unwrap().unwrap();
        assert_eq!(top.as_namespace().unwrap().namespace, "com");
        assert!(content.get_parent(&top).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_snapshot_and_relocation() {
        let content = content("default");
        let version = selector("com.example", "foo", "1.0-SNAPSHOT");
        let mut metadata = ArtifactMetadata::for_version("com.example", "foo", "1.0-SNAPSHOT");
        let build = version::SnapshotBuild::parse("1.0-20240101.120000-2").unwrap();
        metadata.register_snapshot_build(&build, "", "jar", chrono::Utc::now());
        content.write_metadata(&version, &metadata).await.unwrap();

        let request = version.to_builder().extension("jar").build();
        match content.resolve_artifact(&request).await.unwrap() {
            ArtifactResolution::Found(a) => {
                assert_eq!(a.coordinates.artifact_version, "1.0-20240101.120000-2")
            }
            other => panic!("unexpected {:?}", other),
        }

        let old = selector("org.old", "bar", "1.0");
        let mut metadata = ArtifactMetadata::for_version("org.old", "bar", "1.0");
        metadata.relocation = Some(artifact_repo_core::Relocation {
            group_id: Some("org.new".to_string()),
            artifact_id: None,
            version: None,
            message: None,
            kind: RelocationKind::Permanent,
        });
        content.write_metadata(&old, &metadata).await.unwrap();
        match content.resolve_artifact(&old.to_builder().extension("jar").build()).await.unwrap() {
            ArtifactResolution::Relocated(r) => {
                assert_eq!(r.target_path, "org/new/bar/1.0/bar-1.0.jar")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_characteristic() {
        let content = content("default");
        let data: ContentItem = content
            .items()
            .data("com/example/foo/1.0/foo-1.0.jar", DataKind::Other)
            .unwrap()
            .into();
        let artifact = content.characteristic(&data, ItemKind::Artifact).unwrap();
        assert_eq!(artifact.as_artifact().unwrap().coordinates.artifact_id, "foo");
        assert!(content.characteristic(&data, ItemKind::Project).is_none());

        let namespace: ContentItem = content
            .get_namespace(&ItemSelector::builder().namespace("com.example.foo").build())
            .unwrap()
            .into();
        let project = content.characteristic(&namespace, ItemKind::Project).unwrap();
        let project = project.as_project().unwrap();
        assert_eq!(project.namespace, "com.example");
        assert_eq!(project.project_id, "foo");

        let legacy = super::tests::content("legacy");
        let ns: ContentItem = legacy
            .get_namespace(&ItemSelector::builder().namespace("com.example").build())
            .unwrap()
            .into();
        assert!(legacy.characteristic(&ns, ItemKind::Version).is_none());
    }

    #[tokio::test]
    async fn test_visit_items_stops_early() {
        let content = content("default");
        seed(
            &content,
            &["com/example/foo/1.0/foo-1.0.jar", "com/example/foo/1.1/foo-1.1.jar"],
        )
        .await;
        let mut seen = Vec::new();
        let visited = content
            .visit_items(&ItemSelector::builder().namespace("com.example").build(), |item| {
                seen.push(item.path().to_string());
                ControlFlow::Break(())
            })
            .await
            .unwrap();
        assert_eq!(visited, 1);
        assert_eq!(seen, vec!["com/example/foo/1.0/foo-1.0.jar"]);
    }

    #[tokio::test]
    async fn test_detached_content_refuses_writes() {
        let content = content("default");
        content.set_repository(None).unwrap();
        assert!(matches!(
            content.active_repository().unwrap_err(),
            RepositoryError::InvalidState(_)
        ));
        let other = repository("other", "default", true, true);
        assert!(content.set_repository(Some(other)).unwrap_err().is_invalid_argument());
    }
}
