//! Proxy fetch-through
//!
//! A managed repository can be connected to remote repositories. When it
//! lacks a requested file, the proxy handler tries the connected remotes in
//! connector order and stores the first hit locally. Fetch failures and
//! timeouts skip to the next remote; they never fail the request.

use artifact_repo_core::{ArtifactMetadata, AssetReader, RepositoryError, Result, StorageAsset};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use crate::content::ManagedRepositoryContent;
use crate::registry::RepositoryRegistry;
use crate::remote::RemoteRepositoryContent;

/// Fetches missing content from the remotes a repository proxies
#[async_trait]
pub trait RepositoryProxyHandler: Send + Sync {
    /// Fetch `path` into `content`. Returns the local asset on a hit.
    async fn fetch_from_proxies(
        &self,
        content: &ManagedRepositoryContent,
        path: &str,
    ) -> Result<Option<StorageAsset>>;

    /// Merge the remotes' metadata documents at `path` into the local one.
    /// Returns whether the local document changed.
    async fn fetch_metadata_from_proxies(
        &self,
        content: &ManagedRepositoryContent,
        path: &str,
    ) -> Result<bool>;
}

/// Handler for deployments without proxying
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProxyHandler;

#[async_trait]
impl RepositoryProxyHandler for NoProxyHandler {
    async fn fetch_from_proxies(
        &self,
        _content: &ManagedRepositoryContent,
        _path: &str,
    ) -> Result<Option<StorageAsset>> {
        Ok(None)
    }

    async fn fetch_metadata_from_proxies(
        &self,
        _content: &ManagedRepositoryContent,
        _path: &str,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Proxies from remotes whose storage is locally reachable
pub struct StorageProxyHandler {
    registry: Arc<RepositoryRegistry>,
}

impl StorageProxyHandler {
    pub fn new(registry: Arc<RepositoryRegistry>) -> Self {
        Self { registry }
    }

    /// Remote contents connected to `source`, in connector order. Remotes
    /// that cannot be resolved are skipped.
    async fn remotes(&self, source: &str) -> Vec<Arc<RemoteRepositoryContent>> {
        let mut remotes = Vec::new();
        for connector in self.registry.proxy_connectors_for(source) {
            match self.registry.remote_content(&connector.target_repo_id).await {
                Ok(remote) => remotes.push(remote),
                Err(e) => warn!(
                    source,
                    target = %connector.target_repo_id,
                    error = %e,
                    "Skipping proxy connector"
                ),
            }
        }
        remotes
    }
}

/// Run `operation` against a remote, bounded by the remote's timeout
async fn within<T>(
    remote: &RemoteRepositoryContent,
    path: &str,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(remote.timeout(), operation).await {
        Ok(result) => result,
        Err(_) => Err(RepositoryError::access(
            path,
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no response from '{}' within {:?}", remote.id(), remote.timeout()),
            ),
        )),
    }
}

/// Open `path` on a remote. `Ok(None)` when the remote does not have it.
async fn open_remote(remote: &RemoteRepositoryContent, path: &str) -> Result<Option<AssetReader>> {
    let Some(asset) = remote.local_asset(path)? else {
        debug!(remote = %remote.id(), "Remote has no local transport");
        return Ok(None);
    };
    within(remote, path, async {
        if !asset.is_leaf().await? {
            return Ok(None);
        }
        asset.read_stream().await.map(Some)
    })
    .await
}

/// Read a whole (small) document from a remote
async fn fetch_document(remote: &RemoteRepositoryContent, path: &str) -> Result<Option<Vec<u8>>> {
    let Some(mut reader) = open_remote(remote, path).await? else {
        return Ok(None);
    };
    within(remote, path, async {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        Ok(Some(data))
    })
    .await
}

#[async_trait]
impl RepositoryProxyHandler for StorageProxyHandler {
    #[instrument(skip(self, content), fields(repository = %content.id()))]
    async fn fetch_from_proxies(
        &self,
        content: &ManagedRepositoryContent,
        path: &str,
    ) -> Result<Option<StorageAsset>> {
        for remote in self.remotes(content.id().as_str()).await {
            let mut reader = match open_remote(&remote, path).await {
                Ok(Some(reader)) => reader,
                Ok(None) => continue,
                Err(e) => {
                    warn!(remote = %remote.id(), path, error = %e, "Proxy fetch failed");
                    continue;
                }
            };
            // The transfer streams straight into local storage
            let transfer = content.store_proxied(path, &mut reader);
            match tokio::time::timeout(remote.timeout(), transfer).await {
                Ok(Ok(asset)) => {
                    debug!(remote = %remote.id(), "Fetched from proxy");
                    return Ok(Some(asset));
                }
                Ok(Err(e)) => {
                    warn!(remote = %remote.id(), path, error = %e, "Proxy transfer failed");
                }
                Err(_) => {
                    warn!(remote = %remote.id(), path, timeout = ?remote.timeout(), "Proxy transfer timed out");
                    if let Ok(partial) = content.asset(path) {
                        content.discard_partial(&partial).await;
                    }
                }
            }
        }
        Ok(None)
    }

    #[instrument(skip(self, content), fields(repository = %content.id()))]
    async fn fetch_metadata_from_proxies(
        &self,
        content: &ManagedRepositoryContent,
        path: &str,
    ) -> Result<bool> {
        let local = content.asset(path)?;
        let mut merged = if local.is_leaf().await.map_err(|e| e.with_repository(content.id().as_str()))? {
            match ArtifactMetadata::parse(&local.read_bytes().await?) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!(path, error = %e, "Ignoring unreadable local metadata");
                    None
                }
            }
        } else {
            None
        };
        let original = merged.clone();

        for remote in self.remotes(content.id().as_str()).await {
            let data = match fetch_document(&remote, path).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!(remote = %remote.id(), path, error = %e, "Metadata fetch failed");
                    continue;
                }
            };
            match ArtifactMetadata::parse(&data) {
                Ok(theirs) => match merged.as_mut() {
                    Some(mine) => mine.merge(&theirs),
                    None => merged = Some(theirs),
                },
                Err(e) => warn!(remote = %remote.id(), path, error = %e, "Ignoring remote metadata"),
            }
        }

        match merged {
            Some(mut metadata) if Some(&metadata) != original.as_ref() => {
                metadata.refresh_latest();
                content.write_metadata_at(local.path(), &metadata).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
