//! Group and managed repository resolution
//!
//! A path requested from a group is resolved against the members in
//! priority order; the first member holding the file wins. Metadata
//! documents are different: every member's document is folded into one
//! merged document that is cached for the group's TTL and never persisted.
//! A failing member is skipped with a warning.

use artifact_repo_core::metadata::is_metadata_path;
use artifact_repo_core::storage::normalize_path;
use artifact_repo_core::{
    ArtifactMetadata, Checksum, ChecksumAlgorithm, RelocationKind, Repository, RepositoryError,
    RepositoryId, RepositoryKind, Result, StorageAsset, METADATA_FILE,
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::content::{ArtifactResolution, ManagedRepositoryContent};
use crate::proxy::RepositoryProxyHandler;
use crate::registry::RepositoryRegistry;

const MAX_MERGED_DOCUMENTS: u64 = 10_000;

/// Metadata document synthesized from the members of a group
#[derive(Debug, Clone)]
pub struct MergedMetadata {
    pub group: RepositoryId,
    pub path: String,
    pub metadata: ArtifactMetadata,
    /// Serialized document
    pub data: Vec<u8>,
    pub checksums: Vec<Checksum>,
    /// Members that contributed, in priority order
    pub members: Vec<RepositoryId>,
    pub created: DateTime<Utc>,
    ttl: Duration,
    instance: Arc<Repository>,
}

impl MergedMetadata {
    pub fn checksum(&self, algorithm: ChecksumAlgorithm) -> Option<&Checksum> {
        self.checksums.iter().find(|c| c.algorithm == algorithm)
    }
}

/// Result of resolving a path
#[derive(Debug, Clone)]
pub enum ResolvedContent {
    /// A stored file
    Asset {
        repository: RepositoryId,
        asset: StorageAsset,
    },
    /// A merged group metadata document
    Merged(Arc<MergedMetadata>),
    /// A checksum of a merged metadata document
    MergedChecksum(Checksum),
    /// The artifact moved; the client should be redirected
    Relocated {
        repository: RepositoryId,
        target_path: String,
        kind: RelocationKind,
        message: Option<String>,
    },
}

impl ResolvedContent {
    /// Bytes to serve. Relocations carry no content.
    pub async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self {
            ResolvedContent::Asset { asset, .. } => asset.read_bytes().await.map(Some),
            ResolvedContent::Merged(merged) => Ok(Some(merged.data.clone())),
            ResolvedContent::MergedChecksum(checksum) => {
                Ok(Some(checksum.companion_content().into_bytes()))
            }
            ResolvedContent::Relocated { .. } => Ok(None),
        }
    }

    /// Repository the content came from, for stored files
    pub fn repository(&self) -> Option<&RepositoryId> {
        match self {
            ResolvedContent::Asset { repository, .. }
            | ResolvedContent::Relocated { repository, .. } => Some(repository),
            _ => None,
        }
    }
}

struct MergedExpiry;

impl Expiry<(String, String), Arc<MergedMetadata>> for MergedExpiry {
    fn expire_after_create(
        &self,
        _key: &(String, String),
        value: &Arc<MergedMetadata>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Split `…/artifact-metadata.json.sha256` into the document path and the
/// checksum extension
fn metadata_request(path: &str) -> (String, Option<String>) {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name
        .strip_prefix(METADATA_FILE)
        .and_then(|rest| rest.strip_prefix('.'))
    {
        Some(extension) => (
            path[..path.len() - extension.len() - 1].to_string(),
            Some(extension.to_ascii_lowercase()),
        ),
        None => (path.to_string(), None),
    }
}

/// Resolves paths against groups and managed repositories
pub struct GroupContentResolver {
    registry: Arc<RepositoryRegistry>,
    proxy: Arc<dyn RepositoryProxyHandler>,
    merged: Cache<(String, String), Arc<MergedMetadata>>,
}

impl GroupContentResolver {
    pub fn new(registry: Arc<RepositoryRegistry>, proxy: Arc<dyn RepositoryProxyHandler>) -> Self {
        let merged = Cache::builder()
            .max_capacity(MAX_MERGED_DOCUMENTS)
            .expire_after(MergedExpiry)
            .build();
        Self {
            registry,
            proxy,
            merged,
        }
    }

    /// Resolve `path` in a group or managed repository
    #[instrument(skip(self))]
    pub async fn resolve(&self, repository_id: &str, path: &str) -> Result<ResolvedContent> {
        let path = normalize_path(path)?;
        let repository = self
            .registry
            .find(repository_id)
            .ok_or_else(|| RepositoryError::RepositoryNotFound(repository_id.to_string()))?;
        match repository.kind() {
            RepositoryKind::Group => self.resolve_group(&repository, &path).await,
            RepositoryKind::Managed => {
                let content = self.registry.managed_content(repository_id).await?;
                self.resolve_managed(&content, &path).await
            }
            RepositoryKind::Remote => Err(RepositoryError::InvalidArgument(format!(
                "Remote repository '{}' is only reachable through a proxy connector",
                repository_id
            ))),
        }
    }

    /// Resolve in one managed repository: stored file, relocation, then a
    /// single proxy fetch
    pub async fn resolve_managed(
        &self,
        content: &ManagedRepositoryContent,
        path: &str,
    ) -> Result<ResolvedContent> {
        let asset = content.asset(path)?;
        if asset
            .is_leaf()
            .await
            .map_err(|e| e.with_repository(content.id().as_str()))?
        {
            return Ok(ResolvedContent::Asset {
                repository: content.id().clone(),
                asset,
            });
        }

        if let Some(artifact) = content.items().parse_artifact(path) {
            let selector = artifact.coordinates.to_selector();
            match content.resolve_artifact(&selector).await? {
                ArtifactResolution::Relocated(relocated) => {
                    return Ok(ResolvedContent::Relocated {
                        repository: content.id().clone(),
                        target_path: relocated.target_path,
                        kind: relocated.kind,
                        message: relocated.message,
                    });
                }
                ArtifactResolution::Found(found) if found.base.asset.path() != path => {
                    // Generic snapshot request mapped to a deployed build
                    if found.base.asset.is_leaf().await? {
                        return Ok(ResolvedContent::Asset {
                            repository: content.id().clone(),
                            asset: found.base.asset,
                        });
                    }
                }
                ArtifactResolution::Found(_) => {}
            }
        }

        if is_metadata_path(path) {
            let (document, _) = metadata_request(path);
            let changed = match self.proxy.fetch_metadata_from_proxies(content, &document).await {
                Ok(changed) => changed,
                Err(e) => {
                    warn!(repository = %content.id(), path = %document, error = %e, "Proxy metadata fetch failed");
                    false
                }
            };
            if changed && asset.is_leaf().await? {
                return Ok(ResolvedContent::Asset {
                    repository: content.id().clone(),
                    asset,
                });
            }
        } else {
            match self.proxy.fetch_from_proxies(content, path).await {
                Ok(Some(asset)) => {
                    return Ok(ResolvedContent::Asset {
                        repository: content.id().clone(),
                        asset,
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(repository = %content.id(), path = %path, error = %e, "Proxy fetch failed");
                }
            }
        }
        Err(RepositoryError::ContentNotFound(format!(
            "{} in repository '{}'",
            path,
            content.id()
        )))
    }

    async fn resolve_group(&self, group: &Arc<Repository>, path: &str) -> Result<ResolvedContent> {
        if is_metadata_path(path) {
            let (document, extension) = metadata_request(path);
            let merged = self.merged_metadata(group, &document).await?;
            return match extension {
                None => Ok(ResolvedContent::Merged(merged)),
                Some(extension) => ChecksumAlgorithm::from_extension(&extension)
                    .and_then(|algorithm| merged.checksum(algorithm).cloned())
                    .map(ResolvedContent::MergedChecksum)
                    .ok_or_else(|| RepositoryError::ContentNotFound(path.to_string())),
            };
        }

        for member in self.members(group) {
            let content = match self.registry.managed_content(member.as_str()).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(group = %group.id(), member = %member, error = %e, "Skipping group member");
                    continue;
                }
            };
            match self.resolve_managed(&content, path).await {
                Ok(resolved) => return Ok(resolved),
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(group = %group.id(), member = %member, error = %e, "Skipping group member");
                }
            }
        }
        Err(RepositoryError::ContentNotFound(format!(
            "{} in group '{}'",
            path,
            group.id()
        )))
    }

    fn members(&self, group: &Repository) -> Vec<RepositoryId> {
        group
            .group_settings()
            .map(|s| s.members.clone())
            .unwrap_or_default()
    }

    /// Merged document for a group, from the cache when it was built for
    /// the current group instance
    pub async fn merged_metadata(
        &self,
        group: &Arc<Repository>,
        document: &str,
    ) -> Result<Arc<MergedMetadata>> {
        let key = (group.id().to_string(), document.to_string());
        if let Some(cached) = self.merged.get(&key).await {
            if Arc::ptr_eq(&cached.instance, group) {
                return Ok(cached);
            }
            self.merged.invalidate(&key).await;
        }
        self.merged
            .try_get_with(key, self.build_merged(group.clone(), document.to_string()))
            .await
            .map_err(|e| match e.as_ref() {
                RepositoryError::ContentNotFound(path) => RepositoryError::ContentNotFound(path.clone()),
                other => RepositoryError::Internal(other.to_string()),
            })
    }

    async fn build_merged(&self, group: Arc<Repository>, document: String) -> Result<Arc<MergedMetadata>> {
        let mut merged: Option<ArtifactMetadata> = None;
        let mut members = Vec::new();
        for member in self.members(&group) {
            match self.member_metadata(member.as_str(), &document).await {
                Ok(Some(metadata)) => {
                    match merged.as_mut() {
                        Some(mine) => mine.merge(&metadata),
                        None => merged = Some(metadata),
                    }
                    members.push(member);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(group = %group.id(), member = %member, error = %e, "Skipping member metadata");
                }
            }
        }

        let metadata = merged.ok_or_else(|| {
            RepositoryError::ContentNotFound(format!("{} in group '{}'", document, group.id()))
        })?;
        let data = metadata.to_bytes()?;
        let checksums = Checksum::compute_all(&data);
        let ttl = group
            .group_settings()
            .map(|s| s.merged_index_ttl)
            .unwrap_or(Duration::from_secs(30 * 60));
        debug!(group = %group.id(), document = %document, members = members.len(), "Built merged metadata");
        Ok(Arc::new(MergedMetadata {
            group: group.id().clone(),
            path: document,
            metadata,
            data,
            checksums,
            members,
            created: Utc::now(),
            ttl,
            instance: group,
        }))
    }

    async fn member_metadata(&self, member: &str, document: &str) -> Result<Option<ArtifactMetadata>> {
        let content = self.registry.managed_content(member).await?;
        if let Err(e) = self.proxy.fetch_metadata_from_proxies(&content, document).await {
            warn!(member, error = %e, "Proxy metadata fetch failed");
        }
        let asset = content.asset(document)?;
        if !asset.is_leaf().await? {
            return Ok(None);
        }
        ArtifactMetadata::parse(&asset.read_bytes().await?).map(Some)
    }

    /// Drop the cached merged documents of a group
    pub async fn invalidate_group(&self, group_id: &str) -> usize {
        let keys: Vec<(String, String)> = self
            .merged
            .iter()
            .filter(|(key, _)| key.0 == group_id)
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &keys {
            self.merged.invalidate(key).await;
        }
        keys.len()
    }
}
