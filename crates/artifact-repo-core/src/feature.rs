//! Optional repository features
//!
//! Features are a closed set of known variants stored in a [`FeatureMap`]
//! keyed by [`FeatureKind`]. Asking for an absent feature is not an error;
//! `supports` answers with a boolean.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::RepositoryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    IndexCreation,
    Staging,
    ArtifactCleanup,
    RemoteIndex,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::IndexCreation => "index_creation",
            FeatureKind::Staging => "staging",
            FeatureKind::ArtifactCleanup => "artifact_cleanup",
            FeatureKind::RemoteIndex => "remote_index",
        };
        f.write_str(name)
    }
}

/// Where and how a repository's search index is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCreationFeature {
    pub skip_packed_index: bool,
    pub index_path: String,
}

/// Deployments go through a staging repository first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingFeature {
    pub stage_repo_needed: bool,
    pub staging_repository: Option<RepositoryId>,
}

/// Snapshot retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCleanupFeature {
    /// Snapshots older than this many days are purged
    pub retention_period_days: u32,
    /// Newest snapshot versions always kept, regardless of age
    pub retention_count: u32,
    /// Purge snapshots whose release has been deployed
    pub delete_released_snapshots: bool,
}

impl Default for ArtifactCleanupFeature {
    fn default() -> Self {
        Self {
            retention_period_days: 100,
            retention_count: 2,
            delete_released_snapshots: false,
        }
    }
}

/// Remote index download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIndexFeature {
    pub download_remote_index: bool,
    pub index_uri: Option<String>,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryFeature {
    IndexCreation(IndexCreationFeature),
    Staging(StagingFeature),
    ArtifactCleanup(ArtifactCleanupFeature),
    RemoteIndex(RemoteIndexFeature),
}

impl RepositoryFeature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            RepositoryFeature::IndexCreation(_) => FeatureKind::IndexCreation,
            RepositoryFeature::Staging(_) => FeatureKind::Staging,
            RepositoryFeature::ArtifactCleanup(_) => FeatureKind::ArtifactCleanup,
            RepositoryFeature::RemoteIndex(_) => FeatureKind::RemoteIndex,
        }
    }
}

/// Capability map of a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMap {
    features: BTreeMap<FeatureKind, RepositoryFeature>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a feature
    pub fn insert(&mut self, feature: RepositoryFeature) {
        self.features.insert(feature.kind(), feature);
    }

    pub fn with(mut self, feature: RepositoryFeature) -> Self {
        self.insert(feature);
        self
    }

    pub fn supports(&self, kind: FeatureKind) -> bool {
        self.features.contains_key(&kind)
    }

    pub fn get(&self, kind: FeatureKind) -> Option<&RepositoryFeature> {
        self.features.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        self.features.keys().copied()
    }

    pub fn index_creation(&self) -> Option<&IndexCreationFeature> {
        match self.get(FeatureKind::IndexCreation) {
            Some(RepositoryFeature::IndexCreation(f)) => Some(f),
            _ => None,
        }
    }

    pub fn staging(&self) -> Option<&StagingFeature> {
        match self.get(FeatureKind::Staging) {
            Some(RepositoryFeature::Staging(f)) => Some(f),
            _ => None,
        }
    }

    pub fn artifact_cleanup(&self) -> Option<&ArtifactCleanupFeature> {
        match self.get(FeatureKind::ArtifactCleanup) {
            Some(RepositoryFeature::ArtifactCleanup(f)) => Some(f),
            _ => None,
        }
    }

    pub fn remote_index(&self) -> Option<&RemoteIndexFeature> {
        match self.get(FeatureKind::RemoteIndex) {
            Some(RepositoryFeature::RemoteIndex(f)) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_map_lookup() {
        let map = FeatureMap::new()
            .with(RepositoryFeature::ArtifactCleanup(ArtifactCleanupFeature::default()));
        assert!(map.supports(FeatureKind::ArtifactCleanup));
        assert!(!map.supports(FeatureKind::Staging));
        assert_eq!(map.artifact_cleanup().unwrap().retention_count, 2);
        assert!(map.staging().is_none());
    }

    #[test]
    fn test_insert_replaces_same_kind() {
        let mut map = FeatureMap::new();
        map.insert(RepositoryFeature::ArtifactCleanup(ArtifactCleanupFeature::default()));
        map.insert(RepositoryFeature::ArtifactCleanup(ArtifactCleanupFeature {
            retention_period_days: 1,
            retention_count: 0,
            delete_released_snapshots: true,
        }));
        assert_eq!(map.kinds().count(), 1);
        assert_eq!(map.artifact_cleanup().unwrap().retention_period_days, 1);
    }
}
