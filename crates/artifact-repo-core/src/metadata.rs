//! Repository metadata documents
//!
//! Metadata lives next to content as `artifact-metadata.json`:
//!
//! - namespace level: the plugins published under the namespace
//! - project level: known versions plus `latest`/`release` pointers
//! - version level: snapshot build info and relocation markers
//!
//! Groups synthesize a merged document from every member that has one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::item::ArtifactCoordinates;
use crate::selector::ItemSelector;
use crate::version::{self, SnapshotBuild};

/// File name of metadata documents
pub const METADATA_FILE: &str = "artifact-metadata.json";

/// Whether a path (or file name) names a metadata document or one of its checksums
pub fn is_metadata_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name == METADATA_FILE
        || name
            .strip_prefix(METADATA_FILE)
            .and_then(|rest| rest.strip_prefix('.'))
            .map(crate::checksum::is_checksum_extension)
            .unwrap_or(false)
}

/// How a relocation should be treated by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelocationKind {
    #[default]
    Permanent,
    Temporary,
}

impl fmt::Display for RelocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocationKind::Permanent => write!(f, "permanent"),
            RelocationKind::Temporary => write!(f, "temporary"),
        }
    }
}

/// Declared redirect to other coordinates; unset fields keep the original value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: RelocationKind,
}

impl Relocation {
    /// Selector of the relocation target for an artifact
    pub fn target_selector(&self, from: &ArtifactCoordinates) -> ItemSelector {
        let namespace = self.group_id.as_deref().unwrap_or(from.namespace.as_str());
        let artifact_id = self.artifact_id.as_deref().unwrap_or(from.artifact_id.as_str());
        let (version, artifact_version) = match self.version.as_deref() {
            Some(version) => (version, version),
            None => (from.version.as_str(), from.artifact_version.as_str()),
        };
        ItemSelector::builder()
            .namespace(namespace)
            .project_id(artifact_id)
            .version(version)
            .artifact_id(artifact_id)
            .artifact_version(artifact_version)
            .classifier(&from.classifier)
            .extension(&from.extension)
            .artifact_type(&from.artifact_type)
            .build()
    }
}

/// Plugin published under a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub prefix: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Latest snapshot build of a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub timestamp: String,
    pub build_number: u32,
}

/// Concrete file version of one snapshot artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotVersion {
    #[serde(default)]
    pub classifier: String,
    pub extension: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// Metadata document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Known versions, ascending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_versions: Vec<SnapshotVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocation: Option<Relocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ArtifactMetadata {
    /// Project level document
    pub fn for_project(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            artifact_id: Some(artifact_id.into()),
            ..Default::default()
        }
    }

    /// Version level document
    pub fn for_version(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: Some(group_id.into()),
            artifact_id: Some(artifact_id.into()),
            version: Some(version.into()),
            ..Default::default()
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Add a version and refresh `latest`/`release`. Returns `false` if it was known.
    pub fn add_version(&mut self, version: &str) -> bool {
        if self.has_version(version) {
            return false;
        }
        self.versions.push(version.to_string());
        self.refresh_latest();
        true
    }

    /// Remove a version and refresh `latest`/`release`. Returns `false` if it was unknown.
    pub fn remove_version(&mut self, version: &str) -> bool {
        let before = self.versions.len();
        self.versions.retain(|v| v != version);
        let removed = self.versions.len() != before;
        if removed {
            self.refresh_latest();
        }
        removed
    }

    /// Sort versions and recompute `latest` (any version) and `release` (non-snapshot)
    pub fn refresh_latest(&mut self) {
        version::sort_versions(&mut self.versions);
        self.versions.dedup();
        self.latest = self.versions.last().cloned();
        self.release = self
            .versions
            .iter()
            .rev()
            .find(|v| !version::is_snapshot(v))
            .cloned();
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(at);
    }

    /// Record a deployed snapshot build for one artifact file
    pub fn register_snapshot_build(
        &mut self,
        build: &SnapshotBuild,
        classifier: &str,
        extension: &str,
        at: DateTime<Utc>,
    ) {
        let newer = self
            .snapshot
            .as_ref()
            .map(|s| (&build.timestamp, build.build_number) >= (&s.timestamp, s.build_number))
            .unwrap_or(true);
        if newer {
            self.snapshot = Some(SnapshotInfo {
                timestamp: build.timestamp.clone(),
                build_number: build.build_number,
            });
        }
        let value = build.version();
        match self
            .snapshot_versions
            .iter_mut()
            .find(|sv| sv.classifier == classifier && sv.extension == extension)
        {
            Some(existing) => {
                let superseded = SnapshotBuild::parse(&existing.value)
                    .map(|current| {
                        (&build.timestamp, build.build_number)
                            >= (&current.timestamp, current.build_number)
                    })
                    .unwrap_or(true);
                if superseded {
                    existing.value = value;
                    existing.updated = Some(at);
                }
            }
            None => self.snapshot_versions.push(SnapshotVersion {
                classifier: classifier.to_string(),
                extension: extension.to_string(),
                value,
                updated: Some(at),
            }),
        }
        self.last_updated = Some(at);
    }

    /// Concrete file version for a generic snapshot artifact, if recorded
    pub fn snapshot_artifact_version(&self, classifier: &str, extension: &str) -> Option<String> {
        if let Some(sv) = self
            .snapshot_versions
            .iter()
            .find(|sv| sv.classifier == classifier && sv.extension == extension)
        {
            return Some(sv.value.clone());
        }
        let snapshot = self.snapshot.as_ref()?;
        let base = version::strip_snapshot(self.version.as_deref()?);
        Some(format!(
            "{}-{}-{}",
            base, snapshot.timestamp, snapshot.build_number
        ))
    }

    /// Fold `other` into this document.
    ///
    /// Versions, plugins and snapshot versions are unioned. Scalars are taken
    /// from `other` only when it is strictly newer by `last_updated`, or when
    /// this document has no value; on equal timestamps this document wins.
    pub fn merge(&mut self, other: &ArtifactMetadata) {
        let other_newer = match (self.last_updated, other.last_updated) {
            (Some(mine), Some(theirs)) => theirs > mine,
            (None, Some(_)) => true,
            _ => false,
        };

        fn pick<T: Clone>(mine: &mut Option<T>, theirs: &Option<T>, prefer_theirs: bool) {
            if theirs.is_some() && (prefer_theirs || mine.is_none()) {
                *mine = theirs.clone();
            }
        }

        pick(&mut self.group_id, &other.group_id, false);
        pick(&mut self.artifact_id, &other.artifact_id, false);
        pick(&mut self.version, &other.version, false);
        pick(&mut self.snapshot, &other.snapshot, other_newer);
        pick(&mut self.relocation, &other.relocation, other_newer);
        pick(&mut self.last_updated, &other.last_updated, other_newer);

        for v in &other.versions {
            if !self.has_version(v) {
                self.versions.push(v.clone());
            }
        }
        for plugin in &other.plugins {
            if !self.plugins.iter().any(|p| p.prefix == plugin.prefix) {
                self.plugins.push(plugin.clone());
            }
        }
        self.plugins.sort_by(|a, b| a.prefix.cmp(&b.prefix));

        for theirs in &other.snapshot_versions {
            match self
                .snapshot_versions
                .iter_mut()
                .find(|sv| sv.classifier == theirs.classifier && sv.extension == theirs.extension)
            {
                Some(mine) => {
                    if theirs.updated > mine.updated {
                        *mine = theirs.clone();
                    }
                }
                None => self.snapshot_versions.push(theirs.clone()),
            }
        }

        let latest = self.latest.clone();
        let release = self.release.clone();
        self.refresh_latest();
        // Explicit pointers survive when the version list cannot express them
        if self.versions.is_empty() {
            let (first, second) = if other_newer {
                ((other.latest.clone(), other.release.clone()), (latest, release))
            } else {
                ((latest, release), (other.latest.clone(), other.release.clone()))
            };
            self.latest = first.0.or(second.0);
            self.release = first.1.or(second.1);
        }
    }
}
