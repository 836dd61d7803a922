//! In-memory storage backend
//!
//! A sorted path tree behind a `parking_lot::RwLock`. Parent containers are
//! created implicitly on write. Used for `mem:` locations and in tests.

use artifact_repo_core::storage::{join_path, AssetReader, AssetStat, RepositoryStorage};
use artifact_repo_core::{RepositoryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Clone)]
enum Node {
    File { data: Bytes, modified: DateTime<Utc> },
    Container { modified: DateTime<Utc> },
}

/// Thread-safe in-memory storage
#[derive(Debug)]
pub struct MemoryStorage {
    id: String,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("mem:anonymous")
    }
}

fn child_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    }
}

fn insert_parents(nodes: &mut BTreeMap<String, Node>, path: &str, now: DateTime<Utc>) -> Result<()> {
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        current = join_path(&current, segment);
        match nodes.get(&current) {
            Some(Node::File { .. }) => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "'{}' is a file, cannot create '{}' below it",
                    current, path
                )))
            }
            Some(Node::Container { .. }) => {}
            None => {
                nodes.insert(current.clone(), Node::Container { modified: now });
            }
        }
    }
    Ok(())
}

impl MemoryStorage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored files
    pub fn file_count(&self) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|n| matches!(n, Node::File { .. }))
            .count()
    }

    /// Every stored path (files and containers), sorted
    pub fn paths(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    fn subtree(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<(String, Node)> {
        let prefix = child_prefix(path);
        let mut entries: Vec<(String, Node)> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(node) = nodes.get(path) {
            entries.insert(0, (path.to_string(), node.clone()));
        }
        entries
    }

    fn remove_subtree(nodes: &mut BTreeMap<String, Node>, path: &str) -> bool {
        let keys: Vec<String> = Self::subtree(nodes, path).into_iter().map(|(k, _)| k).collect();
        for key in &keys {
            nodes.remove(key);
        }
        !keys.is_empty()
    }

    fn transfer(&self, from: &str, to: &str, remove_source: bool) -> Result<()> {
        let now = Utc::now();
        let mut nodes = self.nodes.write();
        let entries = Self::subtree(&nodes, from);
        if entries.is_empty() && !from.is_empty() {
            return Err(RepositoryError::ContentNotFound(from.to_string()));
        }
        if remove_source {
            Self::remove_subtree(&mut nodes, from);
        }
        Self::remove_subtree(&mut nodes, to);
        insert_parents(&mut nodes, to, now)?;
        for (key, node) in entries {
            let suffix = &key[from.len()..];
            let target = format!("{}{}", to, suffix);
            nodes.insert(target, node);
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryStorage for MemoryStorage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn stat(&self, path: &str) -> Result<Option<AssetStat>> {
        if path.is_empty() {
            return Ok(Some(AssetStat::container(None)));
        }
        Ok(self.nodes.read().get(path).map(|node| match node {
            Node::File { data, modified } => AssetStat::file(data.len() as u64, Some(*modified)),
            Node::Container { modified } => AssetStat::container(Some(*modified)),
        }))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let prefix = child_prefix(path);
        let nodes = self.nodes.read();
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    async fn open_read(&self, path: &str) -> Result<AssetReader> {
        match self.nodes.read().get(path) {
            Some(Node::File { data, .. }) => Ok(Box::pin(std::io::Cursor::new(data.clone()))),
            Some(Node::Container { .. }) => Err(RepositoryError::InvalidArgument(format!(
                "'{}' is a container",
                path
            ))),
            None => Err(RepositoryError::ContentNotFound(path.to_string())),
        }
    }

    async fn write(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        append: bool,
    ) -> Result<u64> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| RepositoryError::access(path, e))?;
        let written = buf.len() as u64;

        let now = Utc::now();
        let mut nodes = self.nodes.write();
        if let Some(Node::Container { .. }) = nodes.get(path) {
            return Err(RepositoryError::InvalidArgument(format!(
                "'{}' is a container",
                path
            )));
        }
        insert_parents(&mut nodes, path, now)?;
        let data = match (append, nodes.get(path)) {
            (true, Some(Node::File { data, .. })) => {
                let mut combined = data.to_vec();
                combined.extend_from_slice(&buf);
                Bytes::from(combined)
            }
            _ => Bytes::from(buf),
        };
        nodes.insert(path.to_string(), Node::File { data, modified: now });
        Ok(written)
    }

    async fn create_container(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File { .. }) => Err(RepositoryError::InvalidArgument(format!(
                "'{}' is a file",
                path
            ))),
            Some(Node::Container { .. }) => Ok(()),
            None => {
                insert_parents(&mut nodes, path, now)?;
                nodes.insert(path.to_string(), Node::Container { modified: now });
                Ok(())
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(Self::remove_subtree(&mut self.nodes.write(), path))
    }

    async fn move_asset(&self, from: &str, to: &str) -> Result<()> {
        self.transfer(from, to, true)
    }

    async fn copy_asset(&self, from: &str, to: &str) -> Result<()> {
        self.transfer(from, to, false)
    }
}
