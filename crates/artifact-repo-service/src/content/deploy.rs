//! Writing content: deployments, copies, proxied files and metadata

use artifact_repo_core::version::{self, SnapshotBuild};
use artifact_repo_core::{
    Artifact, ArtifactKind, ArtifactMetadata, AuditAction, Checksum, ChecksummingReader,
    DataItem, DataKind, ItemSelector, LayoutCapability, ReleaseScheme, Repository,
    RepositoryError, Result, StorageAsset,
};
use chrono::Utc;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};

use super::ManagedRepositoryContent;

impl ManagedRepositoryContent {
    /// Deploy an artifact from a stream.
    ///
    /// Fails with a conflict when the repository does not accept the
    /// version's release scheme, or when a release artifact already exists
    /// and redeployment is blocked. Main artifacts get checksum files and
    /// are recorded in the project (and snapshot version) metadata.
    #[instrument(skip(self, reader), fields(repository = %self.id(), selector = %selector))]
    pub async fn add_artifact(
        &self,
        selector: &ItemSelector,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Artifact> {
        let artifact = self.get_artifact(selector)?;
        let repository = self.active_repository()?;
        self.check_deploy(&repository, &artifact).await?;
        self.store(artifact, reader, AuditAction::UploadFile).await
    }

    /// Deploy an artifact from an in-memory buffer
    pub async fn add_artifact_bytes(&self, selector: &ItemSelector, data: &[u8]) -> Result<Artifact> {
        let mut reader = data;
        self.add_artifact(selector, &mut reader).await
    }

    /// Copy an existing asset (from any storage) into this repository under
    /// the selector's coordinates, with the same gating as a deployment
    #[instrument(skip(self, source), fields(repository = %self.id(), source = %source.path()))]
    pub async fn copy_artifact(&self, source: &StorageAsset, selector: &ItemSelector) -> Result<Artifact> {
        let artifact = self.get_artifact(selector)?;
        let repository = self.active_repository()?;
        self.check_deploy(&repository, &artifact).await?;

        if !source.is_leaf().await? {
            return Err(RepositoryError::ContentNotFound(source.path().to_string()));
        }
        let mut reader = source.read_stream().await?;
        self.store(artifact, &mut reader, AuditAction::CopyFile).await
    }

    async fn check_deploy(&self, repository: &Repository, artifact: &Artifact) -> Result<()> {
        let snapshot = version::is_snapshot(&artifact.coordinates.artifact_version);
        let scheme = if snapshot {
            ReleaseScheme::Snapshot
        } else {
            ReleaseScheme::Release
        };
        if !repository.supports_release_scheme(scheme) {
            return Err(RepositoryError::Conflict(format!(
                "Repository '{}' does not accept {} versions ({})",
                self.id(),
                scheme,
                artifact.coordinates
            )));
        }
        if !snapshot
            && artifact.kind == ArtifactKind::Main
            && repository.blocks_redeployments()
            && artifact
                .base
                .asset
                .exists()
                .await
                .map_err(|e| self.storage_error(e))?
        {
            return Err(RepositoryError::Conflict(format!(
                "'{}' already exists in '{}' and redeployment is blocked",
                artifact.base.asset.path(),
                self.id()
            )));
        }
        Ok(())
    }

    async fn store(
        &self,
        artifact: Artifact,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        action: AuditAction,
    ) -> Result<Artifact> {
        let asset = &artifact.base.asset;
        let (size, checksums) = self.write_hashed(asset, reader).await?;
        if artifact.kind == ArtifactKind::Main {
            self.write_checksums(asset, checksums).await?;
            self.record_deployment(&artifact).await?;
        }
        self.audit().emit(self.id(), asset.path(), action).await;
        info!(path = %asset.path(), size, "Stored artifact");
        Ok(artifact)
    }

    /// Stream into `asset`, hashing on the way through
    async fn write_hashed(
        &self,
        asset: &StorageAsset,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(u64, Vec<Checksum>)> {
        let mut hashing = ChecksummingReader::new(reader);
        let size = asset
            .write_stream(&mut hashing, false)
            .await
            .map_err(|e| self.storage_error(e))?;
        Ok((size, hashing.finish()))
    }

    /// Store a file fetched from a remote repository. A failed transfer
    /// leaves nothing behind at `path`.
    pub(crate) async fn store_proxied(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<StorageAsset> {
        self.active_repository()?;
        let asset = self.asset(path)?;
        let checksums = match self.write_hashed(&asset, reader).await {
            Ok((_, checksums)) => checksums,
            Err(e) => {
                self.discard_partial(&asset).await;
                return Err(e);
            }
        };
        if let Some(artifact) = self.items().parse_artifact(asset.path()) {
            if artifact.kind == ArtifactKind::Main {
                self.write_checksums(&asset, checksums).await?;
            }
        }
        self.audit()
            .emit(self.id(), asset.path(), AuditAction::ProxyFetch)
            .await;
        debug!(path = %asset.path(), "Stored proxied file");
        Ok(asset)
    }

    /// Remove an incomplete proxied file
    pub(crate) async fn discard_partial(&self, asset: &StorageAsset) {
        if let Err(e) = asset.delete().await {
            warn!(path = %asset.path(), error = %e, "Could not remove partial file");
        }
    }

    async fn write_checksums(&self, asset: &StorageAsset, checksums: Vec<Checksum>) -> Result<()> {
        for checksum in checksums {
            let companion = self.asset(&format!(
                "{}.{}",
                asset.path(),
                checksum.algorithm.extension()
            ))?;
            companion
                .write_bytes(checksum.companion_content().as_bytes())
                .await
                .map_err(|e| self.storage_error(e))?;
        }
        Ok(())
    }

    /// Record a deployed main artifact in the metadata documents
    async fn record_deployment(&self, artifact: &Artifact) -> Result<()> {
        if !self.layout().supports(LayoutCapability::ProjectMetadata) {
            return Ok(());
        }
        let c = &artifact.coordinates;
        let now = Utc::now();
        let project = ItemSelector::builder()
            .namespace(&c.namespace)
            .project_id(&c.project_id)
            .build();
        let mut metadata = self
            .find_metadata(&project)
            .await?
            .unwrap_or_else(|| ArtifactMetadata::for_project(&c.namespace, &c.project_id));
        metadata.add_version(&c.version);
        metadata.touch(now);
        self.write_metadata(&project, &metadata).await?;

        if let Some(build) = SnapshotBuild::parse(&c.artifact_version) {
            let version = project.to_builder().version(&c.version).build();
            let mut metadata = self.find_metadata(&version).await?.unwrap_or_else(|| {
                ArtifactMetadata::for_version(&c.namespace, &c.project_id, &c.version)
            });
            metadata.register_snapshot_build(&build, &c.classifier, &c.extension, now);
            self.write_metadata(&version, &metadata).await?;
        }
        Ok(())
    }

    /// Write a metadata document and its checksum files
    pub async fn write_metadata(
        &self,
        selector: &ItemSelector,
        metadata: &ArtifactMetadata,
    ) -> Result<DataItem> {
        let path = self.layout().metadata_path(selector)?;
        self.write_metadata_at(&path, metadata).await
    }

    /// Write a metadata document at a known metadata path
    pub(crate) async fn write_metadata_at(
        &self,
        path: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<DataItem> {
        self.active_repository()?;
        let item = self.items().data(path, DataKind::Metadata)?;
        let data = metadata.to_bytes()?;
        item.base
            .asset
            .write_bytes(&data)
            .await
            .map_err(|e| self.storage_error(e))?;
        self.write_checksums(&item.base.asset, Checksum::compute_all(&data))
            .await?;
        Ok(item)
    }
}
