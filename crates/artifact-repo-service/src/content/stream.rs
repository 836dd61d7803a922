//! Lazy traversal of repository content
//!
//! [`ItemWalker`] performs a depth-first walk below the most specific
//! container a selector names. Containers are listed only when the walk
//! reaches them, and are emitted after their children (post-order) because
//! their kind is decided by what they contain.

use artifact_repo_core::selector::WILDCARD;
use artifact_repo_core::version;
use artifact_repo_core::{
    ArtifactCoordinates, ArtifactKind, ContentItem, Granularity, ItemKind, ItemSelector,
    LayoutCapability, RepositoryError, Result, StorageAsset,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::items::{is_hidden, ItemFactory};

/// Buffered items between a parallel producer and its consumer
const PARALLEL_BUFFER: usize = 64;

#[derive(Debug)]
struct Frame {
    asset: StorageAsset,
    pending: Option<VecDeque<StorageAsset>>,
    has_artifacts: bool,
    has_versions: bool,
}

impl Frame {
    fn new(asset: StorageAsset) -> Self {
        Self {
            asset,
            pending: None,
            has_artifacts: false,
            has_versions: false,
        }
    }
}

/// Depth-first walker producing the items that match a selector
#[derive(Debug)]
pub(crate) struct ItemWalker {
    items: ItemFactory,
    selector: ItemSelector,
    containers: bool,
    start: Option<StorageAsset>,
    stack: Vec<Frame>,
    ready: VecDeque<ContentItem>,
}

impl ItemWalker {
    /// Walker emitting artifacts and, unless the selector is artifact
    /// specific, the containers at or below its granularity
    pub(crate) fn new(items: ItemFactory, selector: ItemSelector) -> Result<Self> {
        let start = search_root(&items, &selector)?;
        let containers = selector.granularity() != Granularity::Artifact;
        Ok(Self {
            items,
            selector,
            containers,
            start: Some(start),
            stack: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Walker emitting artifacts only
    pub(crate) fn artifacts(items: ItemFactory, selector: ItemSelector) -> Result<Self> {
        let mut walker = Self::new(items, selector)?;
        walker.containers = false;
        Ok(walker)
    }

    pub(crate) async fn next_item(&mut self) -> Result<Option<ContentItem>> {
        if let Some(start) = self.start.take() {
            match start.stat().await? {
                None => {}
                Some(stat) if stat.container => self.stack.push(Frame::new(start)),
                Some(_) => self.visit_leaf(&start),
            }
        }

        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(Some(item));
            }
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            if frame.pending.is_none() {
                let asset = frame.asset.clone();
                let children = asset.list().await?;
                if let Some(frame) = self.stack.last_mut() {
                    frame.pending = Some(children.into());
                }
                continue;
            }

            let child = frame.pending.as_mut().and_then(|p| p.pop_front());
            match child {
                Some(child) => {
                    if is_hidden(child.name()) {
                        continue;
                    }
                    match child.stat().await? {
                        None => {}
                        Some(stat) if stat.container => self.stack.push(Frame::new(child)),
                        Some(_) => self.visit_leaf(&child),
                    }
                }
                None => {
                    if let Some(done) = self.stack.pop() {
                        self.finish_container(done);
                    }
                }
            }
        }
    }

    fn visit_leaf(&mut self, asset: &StorageAsset) {
        let Some(artifact) = self.items.parse_artifact(asset.path()) else {
            return;
        };
        if let Some(parent) = self.stack.last_mut() {
            parent.has_artifacts = true;
        }
        let wanted = match artifact.kind {
            ArtifactKind::Main => true,
            // Companions only when the selector names their extension
            _ => self.selector.extension() == Some(artifact.coordinates.extension.as_str()),
        };
        if wanted && matches_coordinates(&self.selector, &artifact.coordinates) {
            self.ready.push_back(artifact.into());
        }
    }

    fn finish_container(&mut self, frame: Frame) {
        let path = frame.asset.path();
        if path.is_empty() {
            return;
        }
        let layout = self.items.layout();
        let kind = if !layout.supports(LayoutCapability::VersionContainers) {
            // Legacy: only the top-level directories are items
            (!path.contains('/')).then_some(ItemKind::Namespace)
        } else if frame.has_artifacts {
            Some(ItemKind::Version)
        } else if frame.has_versions {
            Some(ItemKind::Project)
        } else {
            Some(ItemKind::Namespace)
        };
        let Some(kind) = kind else {
            return;
        };
        if kind == ItemKind::Version {
            if let Some(parent) = self.stack.last_mut() {
                parent.has_versions = true;
            }
        }
        if !self.containers || granularity_of(kind) < self.selector.granularity() {
            return;
        }
        match self.items.container(path, kind) {
            Ok(item) if matches_container(&self.selector, &item) => self.ready.push_back(item),
            Ok(_) => {}
            Err(e) => debug!(path = %path, error = %e, "Skipping container"),
        }
    }
}

fn granularity_of(kind: ItemKind) -> Granularity {
    match kind {
        ItemKind::Namespace => Granularity::Namespace,
        ItemKind::Project => Granularity::Project,
        ItemKind::Version => Granularity::Version,
        ItemKind::Artifact | ItemKind::Data => Granularity::Artifact,
    }
}

fn concrete(value: Option<&str>) -> Option<&str> {
    value.filter(|v| *v != WILDCARD)
}

/// Most specific existing-or-not container the selector pins down
fn search_root(items: &ItemFactory, selector: &ItemSelector) -> Result<StorageAsset> {
    let root = items.root();
    if concrete(selector.namespace()).is_none() {
        return Ok(root.clone());
    }
    let layout = items.layout();
    let namespace_only = ItemSelector::builder()
        .namespace(selector.namespace().unwrap_or_default())
        .build();
    let mut candidates = Vec::new();
    if let Some(project) = concrete(selector.project_id()) {
        let project_selector = namespace_only.to_builder().project_id(project).build();
        if let Some(version) = concrete(selector.version()) {
            candidates.push(project_selector.to_builder().version(version).build());
        }
        candidates.push(project_selector);
    }
    candidates.push(namespace_only);

    for candidate in candidates {
        let path = match candidate.granularity() {
            Granularity::Version => layout.version_path(&candidate),
            Granularity::Project => layout.project_path(&candidate),
            _ => layout.namespace_path(&candidate),
        };
        match path {
            Ok(path) => return root.resolve(&path),
            Err(RepositoryError::Layout(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(root.clone())
}

pub(crate) fn namespace_matches(selector: &ItemSelector, namespace: &str) -> bool {
    match selector.namespace() {
        None | Some(WILDCARD) => true,
        Some(wanted) => {
            wanted == namespace
                || (selector.recurse()
                    && namespace
                        .strip_prefix(wanted)
                        .map(|rest| rest.starts_with('.'))
                        .unwrap_or(false))
        }
    }
}

fn version_matches(selector: &ItemSelector, directory: &str) -> bool {
    match selector.version() {
        None | Some(WILDCARD) => true,
        Some(wanted) => version::base_version(wanted) == version::base_version(directory),
    }
}

pub(crate) fn matches_coordinates(selector: &ItemSelector, c: &ArtifactCoordinates) -> bool {
    namespace_matches(selector, &c.namespace)
        && selector.matches_project(&c.project_id)
        && version_matches(selector, &c.version)
        && selector.matches_artifact(
            &c.artifact_id,
            &c.artifact_version,
            &c.classifier,
            &c.extension,
            &c.artifact_type,
        )
}

fn matches_container(selector: &ItemSelector, item: &ContentItem) -> bool {
    match item {
        ContentItem::Namespace(ns) => namespace_matches(selector, &ns.namespace),
        ContentItem::Project(p) => {
            namespace_matches(selector, &p.namespace) && selector.matches_project(&p.project_id)
        }
        ContentItem::Version(v) => {
            namespace_matches(selector, &v.namespace)
                && selector.matches_project(&v.project_id)
                && version_matches(selector, &v.version)
        }
        _ => false,
    }
}

/// Forward-only cursor over matching items.
///
/// The stream must be closed when the consumer is done with it; dropping it
/// closes it as well. A parallel stream walks ahead of the consumer on a
/// separate task, which is stopped on close.
pub struct ItemStream {
    inner: Option<BoxStream<'static, Result<ContentItem>>>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ItemStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStream")
            .field("closed", &self.is_closed())
            .field("parallel", &self.producer.is_some())
            .finish()
    }
}

impl ItemStream {
    pub(crate) fn sequential(walker: ItemWalker) -> Self {
        let stream = futures::stream::unfold(Some(walker), |state| async move {
            let mut walker = state?;
            match walker.next_item().await {
                Ok(Some(item)) => Some((Ok(item), Some(walker))),
                Ok(None) => None,
                // Nothing is produced after a storage failure
                Err(e) => Some((Err(e), None)),
            }
        });
        Self {
            inner: Some(stream.boxed()),
            cancel: CancellationToken::new(),
            producer: None,
        }
    }

    pub(crate) fn parallel(mut walker: ItemWalker) -> Self {
        let (tx, rx) = mpsc::channel(PARALLEL_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let producer = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = walker.next_item() => next,
                };
                let (item, last) = match next {
                    Ok(Some(item)) => (Ok(item), false),
                    Ok(None) => break,
                    Err(e) => (Err(e), true),
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                if last {
                    break;
                }
            }
        });
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Self {
            inner: Some(stream.boxed()),
            cancel,
            producer: Some(producer),
        }
    }

    /// Next item, or `None` once the stream is exhausted or closed
    pub async fn next_item(&mut self) -> Option<Result<ContentItem>> {
        match self.inner.as_mut() {
            Some(inner) => inner.next().await,
            None => None,
        }
    }

    /// Release the stream; further reads yield nothing
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.inner = None;
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the remaining items, stopping at the first error
    pub async fn collect_items(mut self) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await {
            items.push(item?);
        }
        self.close();
        Ok(items)
    }
}

impl Stream for ItemStream {
    type Item = Result<ContentItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => inner.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for ItemStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_repo_core::{layout_for, RepositoryId};
    use artifact_repo_storage::MemoryStorage;
    use std::sync::Arc;

    async fn populated(layout: &str, paths: &[&str]) -> ItemFactory {
        let root = StorageAsset::root(Arc::new(MemoryStorage::new("mem:walk")));
        for path in paths {
            root.resolve(path).unwrap().write_bytes(b"content").await.unwrap();
        }
        ItemFactory::new(
            RepositoryId::new("internal").unwrap(),
            layout_for(layout).unwrap(),
            root,
        )
    }

    async fn walk(items: ItemFactory, selector: ItemSelector) -> Vec<(ItemKind, String)> {
        ItemStream::sequential(ItemWalker::new(items, selector).unwrap())
            .collect_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.kind(), i.path().to_string()))
            .collect()
    }

    const TREE: &[&str] = &[
        "com/example/foo/1.0/foo-1.0.jar",
        "com/example/foo/1.0/foo-1.0.jar.sha256",
        "com/example/foo/1.0/foo-1.0-sources.jar",
        "com/example/foo/1.1/foo-1.1.pom",
        "com/example/foo/artifact-metadata.json",
        "com/example/sub/bar/2.0/bar-2.0.jar",
        "com/example/.index/segments",
    ];

    #[tokio::test]
    async fn test_walk_project_post_order() {
        let items = populated("default", TREE).await;
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .build();
        let found = walk(items, selector).await;
        assert_eq!(
            found,
            vec![
                (ItemKind::Artifact, "com/example/foo/1.0/foo-1.0-sources.jar".to_string()),
                (ItemKind::Artifact, "com/example/foo/1.0/foo-1.0.jar".to_string()),
                (ItemKind::Version, "com/example/foo/1.0".to_string()),
                (ItemKind::Artifact, "com/example/foo/1.1/foo-1.1.pom".to_string()),
                (ItemKind::Version, "com/example/foo/1.1".to_string()),
                (ItemKind::Project, "com/example/foo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_namespace_walk_respects_recurse() {
        let items = populated("default", TREE).await;
        let flat = ItemSelector::builder().namespace("com.example").build();
        let found = walk(items.clone(), flat).await;
        assert!(found.iter().all(|(_, p)| !p.starts_with("com/example/sub")));
        assert!(found.contains(&(ItemKind::Namespace, "com/example".to_string())));

        let deep = ItemSelector::builder()
            .namespace("com.example")
            .recurse(true)
            .build();
        let found = walk(items, deep).await;
        assert!(found.contains(&(ItemKind::Artifact, "com/example/sub/bar/2.0/bar-2.0.jar".to_string())));
        assert!(found.contains(&(ItemKind::Namespace, "com/example/sub".to_string())));
        assert!(found.iter().all(|(_, p)| !p.contains(".index")));
    }

    #[tokio::test]
    async fn test_artifact_selector_yields_artifacts_only() {
        let items = populated("default", TREE).await;
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("*")
            .extension("jar")
            .build();
        let found = walk(items, selector).await;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|(k, _)| *k == ItemKind::Artifact));
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let items = populated("default", TREE).await;
        let selector = ItemSelector::builder()
            .namespace("org.missing")
            .project_id("none")
            .build();
        assert!(walk(items, selector).await.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_walk() {
        let items = populated(
            "legacy",
            &["com.example/jars/foo-1.0.jar", "com.example/poms/foo-1.0.pom", "org.other/jars/bar-2.0.jar"],
        )
        .await;
        let selector = ItemSelector::builder().namespace("com.example").build();
        let found = walk(items, selector).await;
        assert_eq!(
            found,
            vec![
                (ItemKind::Artifact, "com.example/jars/foo-1.0.jar".to_string()),
                (ItemKind::Artifact, "com.example/poms/foo-1.0.pom".to_string()),
                (ItemKind::Namespace, "com.example".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_parallel_stream_matches_sequential() {
        let items = populated("default", TREE).await;
        let selector = ItemSelector::builder().namespace("com").recurse(true).build();
        let sequential = walk(items.clone(), selector.clone()).await;
        let parallel: Vec<(ItemKind, String)> =
            ItemStream::parallel(ItemWalker::new(items, selector).unwrap())
                .collect_items()
                .await
                .unwrap()
                .into_iter()
                .map(|i| (i.kind(), i.path().to_string()))
                .collect();
        assert_eq!(sequential, parallel);
    }

    #[tokio::test]
    async fn test_close_stops_stream() {
        let items = populated("default", TREE).await;
        let selector = ItemSelector::builder().namespace("com").recurse(true).build();
        let mut stream = ItemStream::parallel(ItemWalker::new(items, selector).unwrap());
        assert!(stream.next_item().await.is_some());
        stream.close();
        assert!(stream.is_closed());
        assert!(stream.next_item().await.is_none());
    }
}
