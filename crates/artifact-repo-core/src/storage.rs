//! Storage asset abstraction
//!
//! [`RepositoryStorage`] is the only I/O boundary of the engine: every read,
//! write, listing and move of repository content goes through it. Backends
//! address content by relative, `/`-separated paths; the empty path is the
//! storage root.
//!
//! [`StorageAsset`] is a cheap, cloneable handle pairing a backend with a
//! normalized path. Path validation happens when the handle is built, so a
//! malformed path never reaches a backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{RepositoryError, Result};

/// Boxed streaming reader returned by backends
pub type AssetReader = Pin<Box<dyn AsyncRead + Send>>;

/// Metadata about a stored asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStat {
    /// Whether the asset is a container (directory)
    pub container: bool,
    /// Size in bytes; zero for containers
    pub size: u64,
    /// Last modification time, when the backend tracks it
    pub modified: Option<DateTime<Utc>>,
}

impl AssetStat {
    pub fn file(size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            container: false,
            size,
            modified,
        }
    }

    pub fn container(modified: Option<DateTime<Utc>>) -> Self {
        Self {
            container: true,
            size: 0,
            modified,
        }
    }
}

/// Storage backend holding repository content.
///
/// Paths passed to backends are already normalized by [`normalize_path`].
/// Missing assets are reported as `Ok(None)` from [`stat`](Self::stat) and
/// as [`RepositoryError::ContentNotFound`] from reads. Any other backend
/// failure surfaces as [`RepositoryError::ContentAccess`].
#[async_trait]
pub trait RepositoryStorage: Send + Sync + 'static {
    /// Descriptive identifier (usually the location URL) used in logs
    fn id(&self) -> &str;

    /// Metadata for a path, `None` if nothing exists there
    async fn stat(&self, path: &str) -> Result<Option<AssetStat>>;

    /// Names of the direct children of a container, sorted.
    /// Missing containers and files yield an empty list.
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Open a file for streaming reads
    async fn open_read(&self, path: &str) -> Result<AssetReader>;

    /// Stream `reader` into the file at `path`, creating parent containers.
    /// Returns the number of bytes written.
    async fn write(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        append: bool,
    ) -> Result<u64>;

    /// Create a container and any missing parents
    async fn create_container(&self, path: &str) -> Result<()>;

    /// Delete a file or a container with everything below it.
    /// Returns `false` if nothing existed at `path`.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Move within this backend, replacing the target
    async fn move_asset(&self, from: &str, to: &str) -> Result<()>;

    /// Copy within this backend, replacing the target
    async fn copy_asset(&self, from: &str, to: &str) -> Result<()>;
}

/// Normalize a relative storage path.
///
/// Leading and trailing separators are not allowed to smuggle in absolute
/// paths: a path starting with `/` is rejected, a trailing `/` is dropped.
/// Empty segments and `.`/`..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(RepositoryError::InvalidArgument(format!(
            "Storage path '{}' must be relative",
            path
        )));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(RepositoryError::InvalidArgument(format!(
                "Storage path '{}' contains an invalid segment '{}'",
                path, segment
            )));
        }
    }
    Ok(trimmed.to_string())
}

/// Join two normalized relative paths
pub fn join_path(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

/// Handle to a physical file or container
#[derive(Clone)]
pub struct StorageAsset {
    storage: Arc<dyn RepositoryStorage>,
    path: String,
}

impl fmt::Debug for StorageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAsset")
            .field("storage", &self.storage.id())
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for StorageAsset {
    fn eq(&self, other: &Self) -> bool {
        self.same_storage(other) && self.path == other.path
    }
}

impl Eq for StorageAsset {}

impl StorageAsset {
    /// Root container of a backend
    pub fn root(storage: Arc<dyn RepositoryStorage>) -> Self {
        Self {
            storage,
            path: String::new(),
        }
    }

    /// Handle for `path` on `storage`
    pub fn new(storage: Arc<dyn RepositoryStorage>, path: &str) -> Result<Self> {
        let path = normalize_path(path)?;
        Ok(Self { storage, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; empty for the root
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn storage(&self) -> &Arc<dyn RepositoryStorage> {
        &self.storage
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Parent container, `None` for the root
    pub fn parent(&self) -> Option<StorageAsset> {
        if self.path.is_empty() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => self.path[..idx].to_string(),
            None => String::new(),
        };
        Some(Self {
            storage: Arc::clone(&self.storage),
            path: parent,
        })
    }

    /// Resolve a relative path below this asset
    pub fn resolve(&self, relative: &str) -> Result<StorageAsset> {
        let relative = normalize_path(relative)?;
        Ok(Self {
            storage: Arc::clone(&self.storage),
            path: join_path(&self.path, &relative),
        })
    }

    /// Whether both handles point into the same backend instance
    pub fn same_storage(&self, other: &StorageAsset) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.storage) as *const (),
            Arc::as_ptr(&other.storage) as *const (),
        )
    }

    pub async fn stat(&self) -> Result<Option<AssetStat>> {
        self.storage.stat(&self.path).await
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.stat().await?.is_some())
    }

    pub async fn is_container(&self) -> Result<bool> {
        Ok(self.stat().await?.map(|s| s.container).unwrap_or(false))
    }

    pub async fn is_leaf(&self) -> Result<bool> {
        Ok(self.stat().await?.map(|s| !s.container).unwrap_or(false))
    }

    /// Size in bytes; fails with `ContentNotFound` when missing
    pub async fn size(&self) -> Result<u64> {
        self.stat()
            .await?
            .map(|s| s.size)
            .ok_or_else(|| RepositoryError::ContentNotFound(self.path.clone()))
    }

    pub async fn modification_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.stat().await?.and_then(|s| s.modified))
    }

    /// Direct children, sorted by name
    pub async fn list(&self) -> Result<Vec<StorageAsset>> {
        let names = self.storage.list(&self.path).await?;
        Ok(names
            .into_iter()
            .map(|name| Self {
                storage: Arc::clone(&self.storage),
                path: join_path(&self.path, &name),
            })
            .collect())
    }

    pub async fn read_stream(&self) -> Result<AssetReader> {
        self.storage.open_read(&self.path).await
    }

    /// Read the whole file into memory
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut reader = self.read_stream().await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| RepositoryError::access(self.path.clone(), e))?;
        Ok(buf)
    }

    pub async fn write_stream(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        append: bool,
    ) -> Result<u64> {
        if self.path.is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "Cannot write to the storage root".to_string(),
            ));
        }
        self.storage.write(&self.path, reader, append).await
    }

    pub async fn write_bytes(&self, data: &[u8]) -> Result<u64> {
        let mut reader = data;
        self.write_stream(&mut reader, false).await
    }

    pub async fn create_container(&self) -> Result<()> {
        self.storage.create_container(&self.path).await
    }

    /// Delete this asset (recursively for containers)
    pub async fn delete(&self) -> Result<bool> {
        self.storage.delete(&self.path).await
    }

    /// Move to `target`; across backends this copies and then deletes
    pub async fn move_to(&self, target: &StorageAsset) -> Result<()> {
        if self.same_storage(target) {
            return self.storage.move_asset(&self.path, &target.path).await;
        }
        self.copy_to(target).await?;
        self.delete().await?;
        Ok(())
    }

    /// Copy to `target`; across backends the content is streamed
    pub async fn copy_to(&self, target: &StorageAsset) -> Result<()> {
        if self.same_storage(target) {
            return self.storage.copy_asset(&self.path, &target.path).await;
        }
        let mut pending = vec![(self.clone(), target.clone())];
        while let Some((source, destination)) = pending.pop() {
            match source.stat().await? {
                None => return Err(RepositoryError::ContentNotFound(source.path.clone())),
                Some(stat) if stat.container => {
                    destination.create_container().await?;
                    for child in source.list().await? {
                        let next = destination.resolve(child.name())?;
                        pending.push((child, next));
                    }
                }
                Some(_) => {
                    let mut reader = source.read_stream().await?;
                    destination.write_stream(&mut reader, false).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path("com/example/").unwrap(), "com/example");
        assert_eq!(normalize_path("a/b/c.jar").unwrap(), "a/b/c.jar");
        assert!(normalize_path("/etc/passwd").is_err());
        assert!(normalize_path("a/../b").is_err());
        assert!(normalize_path("a//b").is_err());
        assert!(normalize_path("./a").is_err());
    }

    #[test]
    fn test_normalize_rejects_before_io() {
        let err = normalize_path("com/../../secret").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", ""), "a");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
    }
}
