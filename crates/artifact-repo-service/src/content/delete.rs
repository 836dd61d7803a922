//! Item deletion
//!
//! Bulk deletion reports one status per affected item to a consumer instead
//! of failing on the first problem, so callers can tell partial success from
//! total failure.

use artifact_repo_core::selector::SelectorField;
use artifact_repo_core::{
    Artifact, AuditAction, ContentItem, Granularity, ItemSelector, LayoutCapability,
    RepositoryError, Result, StorageAsset,
};
use chrono::Utc;
use std::fmt;
use tracing::{info, instrument, warn};

use super::{ItemStream, ItemWalker, ManagedRepositoryContent};

/// Extensions of files that accompany an artifact
const COMPANION_EXTENSIONS: &[&str] = &["sha256", "sha512", "sha1", "md5", "asc"];

/// Per-item deletion outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteStatusCode {
    Ok,
    DeletionFailed,
    ItemNotFound,
    Unknown,
}

impl fmt::Display for DeleteStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeleteStatusCode::Ok => "ok",
            DeleteStatusCode::DeletionFailed => "deletion_failed",
            DeleteStatusCode::ItemNotFound => "item_not_found",
            DeleteStatusCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Status record handed to the deletion consumer
#[derive(Debug)]
pub struct ItemDeleteStatus {
    pub item: ContentItem,
    pub status: DeleteStatusCode,
    pub error: Option<RepositoryError>,
}

impl ItemDeleteStatus {
    fn ok(item: ContentItem) -> Self {
        Self {
            item,
            status: DeleteStatusCode::Ok,
            error: None,
        }
    }

    fn not_found(item: ContentItem) -> Self {
        Self {
            item,
            status: DeleteStatusCode::ItemNotFound,
            error: None,
        }
    }

    fn failed(item: ContentItem, error: RepositoryError) -> Self {
        let status = if error.is_access_failure() {
            DeleteStatusCode::DeletionFailed
        } else {
            DeleteStatusCode::Unknown
        };
        Self {
            item,
            status,
            error: Some(error),
        }
    }
}

/// Counts of the statuses reported by one bulk deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub deleted: usize,
    pub failed: usize,
    pub not_found: usize,
    pub unknown: usize,
}

impl DeletionSummary {
    fn record(&mut self, status: DeleteStatusCode) {
        match status {
            DeleteStatusCode::Ok => self.deleted += 1,
            DeleteStatusCode::DeletionFailed => self.failed += 1,
            DeleteStatusCode::ItemNotFound => self.not_found += 1,
            DeleteStatusCode::Unknown => self.unknown += 1,
        }
    }

    /// Every reported item was deleted
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.unknown == 0 && self.not_found == 0
    }

    pub fn total(&self) -> usize {
        self.deleted + self.failed + self.not_found + self.unknown
    }
}

/// Required coordinates for a bulk deletion at each granularity
fn scope_fields(granularity: Granularity) -> &'static [SelectorField] {
    match granularity {
        Granularity::Project => &[SelectorField::Namespace, SelectorField::ProjectId],
        Granularity::Version => &[
            SelectorField::Namespace,
            SelectorField::ProjectId,
            SelectorField::Version,
        ],
        _ => &[SelectorField::Namespace],
    }
}

impl ManagedRepositoryContent {
    /// Delete a single item. Containers are removed with everything below
    /// them; artifacts take their checksum and signature files along.
    #[instrument(skip(self, item), fields(repository = %self.id(), path = %item.path()))]
    pub async fn delete_item(&self, item: &ContentItem) -> Result<()> {
        self.active_repository()?;
        match item {
            ContentItem::Artifact(artifact) => {
                if !self.delete_artifact_files(artifact).await? {
                    return Err(self.missing(item));
                }
            }
            ContentItem::Data(data) => {
                if !self.delete_asset(&data.base.asset).await? {
                    return Err(self.missing(item));
                }
                self.audit()
                    .emit(self.id(), item.path(), AuditAction::RemoveFile)
                    .await;
            }
            _ => {
                if !self.delete_asset(item.asset()).await? {
                    return Err(self.missing(item));
                }
                self.audit()
                    .emit(self.id(), item.path(), AuditAction::RemoveDir)
                    .await;
                if let ContentItem::Version(version) = item {
                    self.forget_version(&version.namespace, &version.project_id, &version.version)
                        .await?;
                }
            }
        }
        info!("Deleted item");
        Ok(())
    }

    /// Delete everything the selector matches, reporting each affected item
    /// to `consumer`. Argument errors are raised before any storage access;
    /// storage failures are reported per item.
    ///
    /// A namespace selector deletes the whole subtree, a project or version
    /// selector its container, and an artifact-level selector the matching
    /// files (wildcards allowed below the namespace).
    #[instrument(skip(self, consumer), fields(repository = %self.id()))]
    pub async fn delete_all_items<F>(
        &self,
        selector: &ItemSelector,
        mut consumer: F,
    ) -> Result<DeletionSummary>
    where
        F: FnMut(ItemDeleteStatus) + Send,
    {
        let granularity = selector.granularity();
        if granularity == Granularity::None {
            return Err(RepositoryError::InvalidArgument(
                "deleteAllItems requires a selector with coordinates".to_string(),
            ));
        }
        selector.require(scope_fields(granularity), "deleteAllItems")?;
        let container = match granularity {
            Granularity::Artifact => None,
            _ => self.container_item(selector)?,
        };
        let walk = match granularity {
            Granularity::Namespace => selector.to_builder().recurse(true).build(),
            _ => selector.clone(),
        };
        let walker = ItemWalker::artifacts(self.items().clone(), walk)?;
        self.active_repository()?;

        let mut summary = DeletionSummary::default();
        let mut report = |status: ItemDeleteStatus, summary: &mut DeletionSummary| {
            summary.record(status.status);
            consumer(status);
        };

        let artifacts: Vec<Artifact> = match ItemStream::sequential(walker).collect_items().await {
            Ok(items) => items.into_iter().filter_map(ContentItem::into_artifact).collect(),
            Err(e) => {
                let item = match &container {
                    Some(item) => item.clone(),
                    None => self.report_item(selector)?,
                };
                report(ItemDeleteStatus::failed(item, self.storage_error(e)), &mut summary);
                return Ok(summary);
            }
        };

        for artifact in &artifacts {
            let item: ContentItem = artifact.clone().into();
            let status = match self.delete_artifact_files(artifact).await {
                Ok(true) => ItemDeleteStatus::ok(item),
                Ok(false) => ItemDeleteStatus::not_found(item),
                Err(e) => ItemDeleteStatus::failed(item, e),
            };
            report(status, &mut summary);
        }

        match container {
            Some(item) => match self.delete_asset(item.asset()).await {
                Ok(true) => {
                    self.audit()
                        .emit(self.id(), item.path(), AuditAction::RemoveDir)
                        .await;
                    if artifacts.is_empty() {
                        report(ItemDeleteStatus::ok(item.clone()), &mut summary);
                    }
                    if let ContentItem::Version(version) = &item {
                        if let Err(e) = self
                            .forget_version(&version.namespace, &version.project_id, &version.version)
                            .await
                        {
                            warn!(error = %e, "Could not update project metadata");
                        }
                    }
                }
                Ok(false) if artifacts.is_empty() => {
                    report(ItemDeleteStatus::not_found(item), &mut summary)
                }
                Ok(false) => {}
                Err(e) => report(ItemDeleteStatus::failed(item, e), &mut summary),
            },
            None if artifacts.is_empty() => {
                report(ItemDeleteStatus::not_found(self.report_item(selector)?), &mut summary)
            }
            None => {}
        }

        info!(
            deleted = summary.deleted,
            failed = summary.failed,
            not_found = summary.not_found,
            "Bulk deletion finished"
        );
        Ok(summary)
    }

    /// Container removed by a namespace, project or version deletion.
    /// `None` where the layout has no such container.
    fn container_item(&self, selector: &ItemSelector) -> Result<Option<ContentItem>> {
        let item = match selector.granularity() {
            Granularity::Namespace => self.get_namespace(selector).map(ContentItem::from),
            Granularity::Project => self.get_project(selector).map(ContentItem::from),
            Granularity::Version => self.get_version(selector).map(ContentItem::from),
            _ => return Ok(None),
        };
        match item {
            Ok(item) => Ok(Some(item)),
            Err(RepositoryError::Layout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Item describing the selector in a not-found report
    fn report_item(&self, selector: &ItemSelector) -> Result<ContentItem> {
        if let Ok(item) = self.get_item(selector) {
            return Ok(item);
        }
        let mut fallback = selector.to_builder().clear_artifact().build();
        if let Ok(Some(item)) = self.container_item(&fallback) {
            return Ok(item);
        }
        fallback = fallback.to_builder().clear_version().build();
        if let Ok(Some(item)) = self.container_item(&fallback) {
            return Ok(item);
        }
        let namespace = ItemSelector::builder()
            .namespace(selector.namespace().unwrap_or_default())
            .build();
        Ok(self.get_namespace(&namespace)?.into())
    }

    /// Delete an artifact file and its companions. `false` when the main
    /// file was not there.
    pub(crate) async fn delete_artifact_files(&self, artifact: &Artifact) -> Result<bool> {
        let asset = &artifact.base.asset;
        let deleted = self.delete_asset(asset).await?;
        for extension in COMPANION_EXTENSIONS {
            let companion = self.asset(&format!("{}.{}", asset.path(), extension))?;
            self.delete_asset(&companion).await?;
        }
        if deleted {
            self.audit()
                .emit(self.id(), asset.path(), AuditAction::RemoveFile)
                .await;
        }
        Ok(deleted)
    }

    async fn delete_asset(&self, asset: &StorageAsset) -> Result<bool> {
        asset.delete().await.map_err(|e| self.storage_error(e))
    }

    /// Drop a deleted version from the project metadata
    pub(crate) async fn forget_version(
        &self,
        namespace: &str,
        project_id: &str,
        version: &str,
    ) -> Result<()> {
        if !self.layout().supports(LayoutCapability::ProjectMetadata) {
            return Ok(());
        }
        let project = ItemSelector::builder()
            .namespace(namespace)
            .project_id(project_id)
            .build();
        if let Some(mut metadata) = self.find_metadata(&project).await? {
            if metadata.remove_version(version) {
                metadata.touch(Utc::now());
                self.write_metadata(&project, &metadata).await?;
            }
        }
        Ok(())
    }

    fn missing(&self, item: &ContentItem) -> RepositoryError {
        RepositoryError::ItemNotFound(format!("'{}' in repository '{}'", item.path(), self.id()))
    }
}
