//! Repository scanning
//!
//! Managed repositories with a scan interval are walked periodically. Each
//! run collects [`RepositoryStatistics`] and, when the repository carries an
//! artifact cleanup feature, purges old snapshot builds.

use artifact_repo_core::feature::ArtifactCleanupFeature;
use artifact_repo_core::version::{self, SnapshotBuild};
use artifact_repo_core::{ContentItem, ItemKind, ItemSelector, LayoutCapability, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::content::{DeleteStatusCode, ManagedRepositoryContent};

/// Summary of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStatistics {
    pub repository_id: String,
    pub namespaces: u64,
    pub projects: u64,
    pub versions: u64,
    pub artifacts: u64,
    pub data_files: u64,
    /// Bytes held by artifacts
    pub total_size: u64,
    pub artifacts_by_extension: BTreeMap<String, u64>,
    pub started: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

/// Walks a repository and counts what it holds
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryScanner;

impl RepositoryScanner {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, content), fields(repository = %content.id()))]
    pub async fn scan(&self, content: &ManagedRepositoryContent) -> Result<RepositoryStatistics> {
        let started = Utc::now();
        let clock = Instant::now();
        let mut statistics = RepositoryStatistics {
            repository_id: content.id().to_string(),
            started: Some(started),
            ..Default::default()
        };

        let mut artifacts = Vec::new();
        content
            .visit_items(&ItemSelector::empty(), |item| {
                match item.kind() {
                    ItemKind::Namespace => statistics.namespaces += 1,
                    ItemKind::Project => statistics.projects += 1,
                    ItemKind::Version => statistics.versions += 1,
                    ItemKind::Data => statistics.data_files += 1,
                    ItemKind::Artifact => {
                        if let ContentItem::Artifact(artifact) = item {
                            artifacts.push(artifact);
                        }
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;

        for artifact in artifacts {
            statistics.artifacts += 1;
            *statistics
                .artifacts_by_extension
                .entry(artifact.coordinates.extension.clone())
                .or_default() += 1;
            match artifact.base.asset.size().await {
                Ok(size) => statistics.total_size += size,
                Err(e) => debug!(path = %artifact.base.asset.path(), error = %e, "No size"),
            }
        }

        statistics.duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            artifacts = statistics.artifacts,
            total_size = statistics.total_size,
            "Scanned repository"
        );
        Ok(statistics)
    }
}

/// What a purge run removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Timestamped snapshot builds removed
    pub builds_removed: u64,
    /// Snapshot versions removed because their release exists
    pub versions_removed: u64,
    pub failures: u64,
}

/// Snapshot retention policy enforcement
#[derive(Debug, Clone)]
pub struct SnapshotPurge {
    cleanup: ArtifactCleanupFeature,
}

impl SnapshotPurge {
    pub fn new(cleanup: ArtifactCleanupFeature) -> Self {
        Self { cleanup }
    }

    /// Purge with `now` as the reference instant.
    ///
    /// The newest `retention_count` builds of every snapshot version are
    /// always kept; older ones go once they are past the retention period.
    #[instrument(skip(self, content), fields(repository = %content.id()))]
    pub async fn purge(
        &self,
        content: &ManagedRepositoryContent,
        now: DateTime<Utc>,
    ) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        if !content.layout().supports(LayoutCapability::SnapshotTimestamps) {
            debug!("Layout keeps no snapshot builds, skipping purge");
            return Ok(report);
        }

        let mut snapshots = Vec::new();
        content
            .visit_items(&ItemSelector::empty(), |item| {
                if let ContentItem::Version(v) = item {
                    if version::is_snapshot(&v.version) {
                        snapshots.push(v.base.selector);
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;

        let cutoff = now - ChronoDuration::days(i64::from(self.cleanup.retention_period_days));
        for selector in snapshots {
            if self.cleanup.delete_released_snapshots && self.released(content, &selector).await? {
                let summary = content.delete_all_items(&selector, |_| {}).await?;
                report.failures += (summary.failed + summary.unknown) as u64;
                report.versions_removed += 1;
                info!(selector = %selector, "Removed snapshot with released version");
                continue;
            }
            self.purge_builds(content, &selector, cutoff, &mut report).await?;
        }
        Ok(report)
    }

    async fn released(&self, content: &ManagedRepositoryContent, snapshot: &ItemSelector) -> Result<bool> {
        let Some(snapshot_version) = snapshot.version() else {
            return Ok(false);
        };
        let release = snapshot
            .to_builder()
            .version(version::strip_snapshot(snapshot_version))
            .build();
        content.has_content(&release).await
    }

    async fn purge_builds(
        &self,
        content: &ManagedRepositoryContent,
        snapshot: &ItemSelector,
        cutoff: DateTime<Utc>,
        report: &mut PurgeReport,
    ) -> Result<()> {
        let mut builds: Vec<(SnapshotBuild, DateTime<Utc>)> = Vec::new();
        for artifact in content.get_artifacts(snapshot).await? {
            let Some(build) = SnapshotBuild::parse(&artifact.coordinates.artifact_version) else {
                continue;
            };
            let Some(instant) = build.instant() else {
                continue;
            };
            if !builds.iter().any(|(b, _)| b.version() == build.version()) {
                builds.push((build, instant));
            }
        }
        builds.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.0.build_number.cmp(&a.0.build_number))
        });

        let keep = self.cleanup.retention_count as usize;
        for (build, instant) in builds.into_iter().skip(keep) {
            if instant >= cutoff {
                continue;
            }
            let selector = snapshot.to_builder().artifact_version(build.version()).build();
            let mut deleted = 0u64;
            let summary = content
                .delete_all_items(&selector, |status| {
                    if status.status == DeleteStatusCode::Ok {
                        deleted += 1;
                    }
                })
                .await?;
            report.failures += (summary.failed + summary.unknown) as u64;
            if deleted > 0 {
                report.builds_removed += 1;
                debug!(build = %build, "Purged snapshot build");
            }
        }
        Ok(())
    }
}

/// Periodic per-repository scan tasks
#[derive(Default)]
pub struct ScanScheduler {
    tasks: DashMap<String, CancellationToken>,
    statistics: Arc<DashMap<String, RepositoryStatistics>>,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("scheduled", &self.tasks.len())
            .finish()
    }
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scanning `content` every `interval`, replacing an existing
    /// schedule for the same repository. The first run happens one
    /// interval from now.
    pub fn schedule(
        &self,
        content: Arc<ManagedRepositoryContent>,
        interval: Duration,
        cleanup: Option<ArtifactCleanupFeature>,
    ) {
        let id = content.id().to_string();
        let token = CancellationToken::new();
        if let Some(previous) = self.tasks.insert(id.clone(), token.clone()) {
            previous.cancel();
        }

        debug!(repository = %id, interval_secs = interval.as_secs(), "Scheduling scans");
        let statistics = self.statistics.clone();
        let purge = cleanup.map(SnapshotPurge::new);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !content.is_attached() {
                    debug!(repository = %id, "Content detached, stopping scans");
                    break;
                }
                match RepositoryScanner::new().scan(&content).await {
                    Ok(result) => {
                        statistics.insert(id.clone(), result);
                    }
                    Err(e) => warn!(repository = %id, error = %e, "Scan failed"),
                }
                if let Some(ref purge) = purge {
                    if let Err(e) = purge.purge(&content, Utc::now()).await {
                        warn!(repository = %id, error = %e, "Snapshot purge failed");
                    }
                }
            }
        });
    }

    /// Stop the scans of a repository. Returns whether one was scheduled.
    pub fn stop(&self, id: &str) -> bool {
        match self.tasks.remove(id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().cancel();
        }
        self.tasks.clear();
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Result of the latest completed scan
    pub fn statistics(&self, id: &str) -> Option<RepositoryStatistics> {
        self.statistics.get(id).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::{content, seed};
    use chrono::TimeZone;

    fn cleanup(count: u32, days: u32, released: bool) -> ArtifactCleanupFeature {
        ArtifactCleanupFeature {
            retention_period_days: days,
            retention_count: count,
            delete_released_snapshots: released,
        }
    }

    fn snapshot_version() -> ItemSelector {
        ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("1.0-SNAPSHOT")
            .build()
    }

    #[tokio::test]
    async fn test_scan_statistics() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.0/foo-1.0.jar",
                "com/example/foo/1.0/foo-1.0.pom",
                "com/example/bar/2.0/bar-2.0.jar",
            ],
        )
        .await;

        let statistics = RepositoryScanner::new().scan(&content).await.unwrap();
        assert_eq!(statistics.repository_id, "internal");
        assert_eq!(statistics.projects, 2);
        assert_eq!(statistics.versions, 2);
        assert_eq!(statistics.artifacts, 3);
        assert_eq!(statistics.total_size, 12);
        assert_eq!(statistics.artifacts_by_extension.get("jar"), Some(&2));
        assert_eq!(statistics.artifacts_by_extension.get("pom"), Some(&1));
        assert!(statistics.namespaces >= 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_newest_builds() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-20240101.120000-1.jar",
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-20240102.120000-2.jar",
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-20240103.120000-3.jar",
            ],
        )
        .await;

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let report = SnapshotPurge::new(cleanup(1, 10, false))
            .purge(&content, now)
            .await
            .unwrap();
        assert_eq!(report.builds_removed, 2);
        assert_eq!(report.failures, 0);

        let remaining: Vec<String> = content
            .get_artifacts(&snapshot_version())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.coordinates.artifact_version)
            .collect();
        assert_eq!(remaining, vec!["1.0-20240103.120000-3".to_string()]);
    }

    #[tokio::test]
    async fn test_recent_builds_survive_retention_period() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-20240228.120000-1.jar",
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-20240229.120000-2.jar",
            ],
        )
        .await;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let report = SnapshotPurge::new(cleanup(1, 10, false))
            .purge(&content, now)
            .await
            .unwrap();
        assert_eq!(report.builds_removed, 0);
        assert_eq!(content.get_artifacts(&snapshot_version()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_released_snapshots_removed() {
        let content = content("default");
        seed(
            &content,
            &[
                "com/example/foo/1.0-SNAPSHOT/foo-1.0-SNAPSHOT.jar",
                "com/example/foo/1.0/foo-1.0.jar",
            ],
        )
        .await;
        let report = SnapshotPurge::new(cleanup(2, 100, true))
            .purge(&content, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.versions_removed, 1);
        assert!(!content.has_content(&snapshot_version()).await.unwrap());
        let release = snapshot_version().to_builder().version("1.0").build();
        assert!(content.has_content(&release).await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_layout_skipped() {
        let content = content("legacy");
        let report = SnapshotPurge::new(cleanup(1, 0, true))
            .purge(&content, Utc::now())
            .await
            .unwrap();
        assert_eq!(report, PurgeReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_and_stops() {
        let content = Arc::new(content("default"));
        seed(&content, &["com/example/foo/1.0/foo-1.0.jar"]).await;

        let scheduler = ScanScheduler::new();
        scheduler.schedule(content, Duration::from_secs(60), None);
        assert!(scheduler.is_scheduled("internal"));

        for _ in 0..300 {
            if scheduler.statistics("internal").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(scheduler.statistics("internal").unwrap().artifacts, 1);

        assert!(scheduler.stop("internal"));
        assert!(!scheduler.is_scheduled("internal"));
        assert!(!scheduler.stop("internal"));
    }
}
