//! Filesystem storage backend
//!
//! Content lives below a root directory. All I/O goes through `tokio::fs`,
//! so backend calls never block the runtime.

use artifact_repo_core::storage::{AssetReader, AssetStat, RepositoryStorage};
use artifact_repo_core::{RepositoryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, instrument};

/// Storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    id: String,
    root: PathBuf,
}

fn map_io(path: &str, err: std::io::Error) -> RepositoryError {
    if err.kind() == ErrorKind::NotFound {
        RepositoryError::ContentNotFound(path.to_string())
    } else {
        RepositoryError::access(path, err)
    }
}

fn modified(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

impl FilesystemStorage {
    /// Storage rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: format!("file://{}", root.display()),
            root,
        }
    }

    /// Storage rooted at `root`, creating the directory now
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self::new(root);
        fs::create_dir_all(&storage.root)
            .await
            .map_err(|e| RepositoryError::access(storage.root.display().to_string(), e))?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    async fn ensure_parent(&self, target: &Path, path: &str) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RepositoryError::access(path, e))?;
        }
        Ok(())
    }

    async fn metadata(&self, path: &str) -> Result<Option<std::fs::Metadata>> {
        match fs::metadata(self.full_path(path)).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepositoryError::access(path, e)),
        }
    }

    async fn copy_tree(&self, from: &Path, to: &Path, path: &str) -> Result<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((source, target)) = pending.pop() {
            let metadata = fs::metadata(&source).await.map_err(|e| map_io(path, e))?;
            if metadata.is_dir() {
                fs::create_dir_all(&target)
                    .await
                    .map_err(|e| RepositoryError::access(path, e))?;
                let mut entries = fs::read_dir(&source)
                    .await
                    .map_err(|e| RepositoryError::access(path, e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| RepositoryError::access(path, e))?
                {
                    pending.push((entry.path(), target.join(entry.file_name())));
                }
            } else {
                fs::copy(&source, &target)
                    .await
                    .map_err(|e| RepositoryError::access(path, e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryStorage for FilesystemStorage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn stat(&self, path: &str) -> Result<Option<AssetStat>> {
        Ok(self.metadata(path).await?.map(|m| {
            if m.is_dir() {
                AssetStat::container(modified(&m))
            } else {
                AssetStat::file(m.len(), modified(&m))
            }
        }))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        match self.metadata(path).await? {
            Some(m) if m.is_dir() => {}
            _ => return Ok(Vec::new()),
        }
        let mut entries = fs::read_dir(self.full_path(path))
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::access(path, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open_read(&self, path: &str) -> Result<AssetReader> {
        match self.metadata(path).await? {
            None => return Err(RepositoryError::ContentNotFound(path.to_string())),
            Some(m) if m.is_dir() => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "'{}' is a container",
                    path
                )))
            }
            Some(_) => {}
        }
        let file = fs::File::open(self.full_path(path))
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(Box::pin(file))
    }

    #[instrument(skip(self, reader), fields(storage = %self.id))]
    async fn write(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        append: bool,
    ) -> Result<u64> {
        let target = self.full_path(path);
        self.ensure_parent(&target, path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&target)
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        let written = tokio::io::copy(reader, &mut file)
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        file.flush()
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        debug!(bytes = written, "Wrote asset");
        Ok(written)
    }

    async fn create_container(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(path))
            .await
            .map_err(|e| RepositoryError::access(path, e))
    }

    #[instrument(skip(self), fields(storage = %self.id))]
    async fn delete(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        let result = match self.metadata(path).await? {
            None => return Ok(false),
            Some(m) if m.is_dir() => fs::remove_dir_all(&full).await,
            Some(_) => fs::remove_file(&full).await,
        };
        match result {
            Ok(()) => Ok(true),
            // Raced with another deletion
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RepositoryError::access(path, e)),
        }
    }

    async fn move_asset(&self, from: &str, to: &str) -> Result<()> {
        if self.metadata(from).await?.is_none() {
            return Err(RepositoryError::ContentNotFound(from.to_string()));
        }
        let target = self.full_path(to);
        self.ensure_parent(&target, to).await?;
        self.delete(to).await?;
        fs::rename(self.full_path(from), &target)
            .await
            .map_err(|e| RepositoryError::access(from, e))
    }

    async fn copy_asset(&self, from: &str, to: &str) -> Result<()> {
        if self.metadata(from).await?.is_none() {
            return Err(RepositoryError::ContentNotFound(from.to_string()));
        }
        let target = self.full_path(to);
        self.ensure_parent(&target, to).await?;
        self.delete(to).await?;
        self.copy_tree(&self.full_path(from), &target, from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_repo_core::StorageAsset;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, Arc<dyn RepositoryStorage>) {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path().join("repo")).await.unwrap();
        (dir, Arc::new(storage))
    }

    #[tokio::test]
    async fn test_write_read_and_stat() {
        let (_dir, storage) = storage().await;
        let asset = StorageAsset::new(storage, "com/example/foo/1.0/foo-1.0.jar").unwrap();
        assert!(!asset.exists().await.unwrap());

        asset.write_bytes(b"jar-content").await.unwrap();
        assert!(asset.is_leaf().await.unwrap());
        assert_eq!(asset.size().await.unwrap(), 11);
        assert_eq!(asset.read_bytes().await.unwrap(), b"jar-content");
        assert!(asset.parent().unwrap().is_container().await.unwrap());
        assert!(asset.modification_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append() {
        let (_dir, storage) = storage().await;
        let asset = StorageAsset::new(storage, "log.txt").unwrap();
        asset.write_bytes(b"a").await.unwrap();
        let mut more: &[u8] = b"b";
        asset.write_stream(&mut more, true).await.unwrap();
        assert_eq!(asset.read_bytes().await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_list_sorted_and_missing() {
        let (_dir, storage) = storage().await;
        let root = StorageAsset::root(storage);
        root.resolve("b/x").unwrap().write_bytes(b"1").await.unwrap();
        root.resolve("a/y").unwrap().write_bytes(b"2").await.unwrap();
        let names: Vec<String> = root
            .list()
            .await
            .unwrap()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(root.resolve("missing").unwrap().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, storage) = storage().await;
        let asset = StorageAsset::new(storage, "nope.jar").unwrap();
        let err = asset.read_bytes().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_recursive() {
        let (_dir, storage) = storage().await;
        let root = StorageAsset::root(storage);
        root.resolve("a/b/c.jar").unwrap().write_bytes(b"x").await.unwrap();
        let a = root.resolve("a").unwrap();
        assert!(a.delete().await.unwrap());
        assert!(!a.exists().await.unwrap());
        assert!(!a.delete().await.unwrap());
    }

    #[tokio::test]
    async fn test_move_and_copy_tree() {
        let (_dir, storage) = storage().await;
        let root = StorageAsset::root(storage);
        root.resolve("src/one/a.txt").unwrap().write_bytes(b"a").await.unwrap();
        root.resolve("src/two.txt").unwrap().write_bytes(b"b").await.unwrap();

        let src = root.resolve("src").unwrap();
        let copy = root.resolve("copy").unwrap();
        src.copy_to(&copy).await.unwrap();
        assert_eq!(copy.resolve("one/a.txt").unwrap().read_bytes().await.unwrap(), b"a");

        let moved = root.resolve("moved/deeper").unwrap();
        src.move_to(&moved).await.unwrap();
        assert!(!src.exists().await.unwrap());
        assert_eq!(moved.resolve("two.txt").unwrap().read_bytes().await.unwrap(), b"b");
    }
}
