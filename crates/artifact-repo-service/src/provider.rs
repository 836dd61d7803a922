//! Repository provider
//!
//! Converts persisted configuration records into repository instances and
//! back. The registry never interprets configuration itself; it always goes
//! through a [`RepositoryProvider`].

use artifact_repo_core::feature::{
    ArtifactCleanupFeature, IndexCreationFeature, RemoteIndexFeature, StagingFeature,
};
use artifact_repo_core::{
    FeatureMap, GroupSettings, ManagedRepositoryConfig, ManagedSettings, ReleaseScheme,
    RemoteRepositoryConfig, RemoteSettings, Repository, RepositoryCapabilities, RepositoryError,
    RepositoryFeature, RepositoryGroupConfig, RepositoryId, RepositoryVariant, Result,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Suffix of the staging repository id derived for managed repositories
pub const STAGING_SUFFIX: &str = "-stage";

/// Creates repository instances from configuration and the reverse
pub trait RepositoryProvider: Send + Sync {
    fn create_managed_instance(&self, config: &ManagedRepositoryConfig) -> Result<Repository>;

    fn create_remote_instance(&self, config: &RemoteRepositoryConfig) -> Result<Repository>;

    fn create_repository_group(&self, config: &RepositoryGroupConfig) -> Result<Repository>;

    fn managed_configuration(&self, repository: &Repository) -> Result<ManagedRepositoryConfig>;

    fn remote_configuration(&self, repository: &Repository) -> Result<RemoteRepositoryConfig>;

    fn group_configuration(&self, repository: &Repository) -> Result<RepositoryGroupConfig>;
}

/// Provider for Maven repositories. Relative storage locations resolve
/// against `base_dir`.
#[derive(Debug, Clone)]
pub struct MavenRepositoryProvider {
    base_dir: PathBuf,
}

impl MavenRepositoryProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured location to a URL.
    ///
    /// Anything with a scheme of two or more characters is taken as a URL,
    /// so Windows drive letters still count as paths.
    pub fn resolve_location(&self, location: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(location) {
            if url.scheme().len() > 1 {
                return Ok(url);
            }
        }
        let path = self.absolute(Path::new(location))?;
        Url::from_directory_path(&path).map_err(|_| {
            RepositoryError::InvalidArgument(format!("Invalid location: {}", path.display()))
        })
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        if path.is_absolute() {
            return Ok(path);
        }
        let cwd = std::env::current_dir()
            .map_err(|e| RepositoryError::Configuration(format!("No working directory: {}", e)))?;
        Ok(cwd.join(path))
    }

    /// Inverse of [`resolve_location`](Self::resolve_location): file
    /// locations below the base directory become relative again
    pub fn location_string(&self, location: &Url) -> String {
        if location.scheme() == "file" {
            if let Ok(path) = location.to_file_path() {
                let base = self.absolute(&self.base_dir).ok();
                if let Some(relative) = base.as_deref().and_then(|b| path.strip_prefix(b).ok()) {
                    if !relative.as_os_str().is_empty() {
                        return relative.to_string_lossy().into_owned();
                    }
                }
                return path.to_string_lossy().into_owned();
            }
        }
        location.to_string()
    }
}

fn display_name(name: &str, id: &str) -> String {
    if name.trim().is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

fn kind_mismatch(repository: &Repository, expected: &str) -> RepositoryError {
    RepositoryError::InvalidArgument(format!(
        "Repository '{}' is a {} repository, not {}",
        repository.id(),
        repository.kind(),
        expected
    ))
}

impl RepositoryProvider for MavenRepositoryProvider {
    fn create_managed_instance(&self, config: &ManagedRepositoryConfig) -> Result<Repository> {
        let id = RepositoryId::new(&config.id)?;
        let location = self.resolve_location(&config.location)?;

        let mut capabilities = RepositoryCapabilities::new(config.repository_type, &config.layout);
        if config.releases {
            capabilities.release_schemes.insert(ReleaseScheme::Release);
        }
        if config.snapshots {
            capabilities.release_schemes.insert(ReleaseScheme::Snapshot);
        }
        let staging_repository = if config.stage_repo_needed {
            Some(RepositoryId::new(format!("{}{}", config.id, STAGING_SUFFIX))?)
        } else {
            None
        };
        capabilities.features = FeatureMap::new()
            .with(RepositoryFeature::IndexCreation(IndexCreationFeature {
                skip_packed_index: config.skip_packed_index,
                index_path: config.index_path.clone(),
            }))
            .with(RepositoryFeature::Staging(StagingFeature {
                stage_repo_needed: config.stage_repo_needed,
                staging_repository,
            }))
            .with(RepositoryFeature::ArtifactCleanup(ArtifactCleanupFeature {
                retention_period_days: config.retention_period_days,
                retention_count: config.retention_count,
                delete_released_snapshots: config.delete_released_snapshots,
            }));

        let failover_locations = config
            .failover_locations
            .iter()
            .map(|l| self.resolve_location(l))
            .collect::<Result<Vec<_>>>()?;

        Ok(Repository::new(
            id,
            display_name(&config.name, &config.id),
            location,
            capabilities,
            RepositoryVariant::Managed(ManagedSettings {
                block_redeployments: config.block_redeployments,
                scan_interval: config.scan_interval_secs.map(Duration::from_secs),
                failover_locations,
            }),
        ))
    }

    fn create_remote_instance(&self, config: &RemoteRepositoryConfig) -> Result<Repository> {
        let id = RepositoryId::new(&config.id)?;
        let location = Url::parse(&config.url)?;

        let mut capabilities = RepositoryCapabilities::new(config.repository_type, &config.layout);
        capabilities.release_schemes.insert(ReleaseScheme::Release);
        capabilities.release_schemes.insert(ReleaseScheme::Snapshot);
        capabilities.features = FeatureMap::new().with(RepositoryFeature::RemoteIndex(
            RemoteIndexFeature {
                download_remote_index: config.download_remote_index,
                index_uri: config.remote_index_url.clone(),
                download_timeout_secs: config.timeout_secs,
            },
        ));

        Ok(Repository::new(
            id,
            display_name(&config.name, &config.id),
            location,
            capabilities,
            RepositoryVariant::Remote(RemoteSettings {
                timeout: Duration::from_secs(config.timeout_secs),
                check_path: config.check_path.clone(),
            }),
        ))
    }

    fn create_repository_group(&self, config: &RepositoryGroupConfig) -> Result<Repository> {
        let id = RepositoryId::new(&config.id)?;
        let location = match &config.location {
            Some(location) => self.resolve_location(location)?,
            None => self.resolve_location(&config.id)?,
        };
        let members = config
            .members
            .iter()
            .map(RepositoryId::new)
            .collect::<Result<Vec<_>>>()?;

        let mut capabilities = RepositoryCapabilities::new(config.repository_type, &config.layout);
        capabilities.release_schemes.insert(ReleaseScheme::Release);
        capabilities.release_schemes.insert(ReleaseScheme::Snapshot);
        capabilities.features = FeatureMap::new().with(RepositoryFeature::IndexCreation(
            IndexCreationFeature {
                skip_packed_index: false,
                index_path: config.merged_index_path.clone(),
            },
        ));

        Ok(Repository::new(
            id,
            display_name(&config.name, &config.id),
            location,
            capabilities,
            RepositoryVariant::Group(GroupSettings {
                members,
                merged_index_ttl: Duration::from_secs(config.merged_index_ttl_minutes * 60),
                merged_index_path: config.merged_index_path.clone(),
            }),
        ))
    }

    fn managed_configuration(&self, repository: &Repository) -> Result<ManagedRepositoryConfig> {
        let settings = repository
            .managed_settings()
            .ok_or_else(|| kind_mismatch(repository, "managed"))?;
        let features = repository.features();
        let cleanup = features.artifact_cleanup().cloned().unwrap_or_default();
        let index = features.index_creation();

        let mut config = ManagedRepositoryConfig::new(
            repository.id().as_str(),
            self.location_string(repository.location()),
        );
        config.name = repository.name().to_string();
        config.repository_type = repository.repository_type();
        config.layout = repository.layout().to_string();
        config.releases = repository.supports_release_scheme(ReleaseScheme::Release);
        config.snapshots = repository.supports_release_scheme(ReleaseScheme::Snapshot);
        config.block_redeployments = settings.block_redeployments;
        config.scan_interval_secs = settings.scan_interval.map(|d| d.as_secs());
        config.failover_locations = settings
            .failover_locations
            .iter()
            .map(|l| self.location_string(l))
            .collect();
        if let Some(index) = index {
            config.skip_packed_index = index.skip_packed_index;
            config.index_path = index.index_path.clone();
        }
        config.stage_repo_needed = features
            .staging()
            .map(|s| s.stage_repo_needed)
            .unwrap_or(false);
        config.retention_period_days = cleanup.retention_period_days;
        config.retention_count = cleanup.retention_count;
        config.delete_released_snapshots = cleanup.delete_released_snapshots;
        Ok(config)
    }

    fn remote_configuration(&self, repository: &Repository) -> Result<RemoteRepositoryConfig> {
        let settings = repository
            .remote_settings()
            .ok_or_else(|| kind_mismatch(repository, "remote"))?;
        let mut config =
            RemoteRepositoryConfig::new(repository.id().as_str(), repository.location().as_str());
        config.name = repository.name().to_string();
        config.repository_type = repository.repository_type();
        config.layout = repository.layout().to_string();
        config.timeout_secs = settings.timeout.as_secs();
        config.check_path = settings.check_path.clone();
        if let Some(index) = repository.features().remote_index() {
            config.download_remote_index = index.download_remote_index;
            config.remote_index_url = index.index_uri.clone();
        }
        Ok(config)
    }

    fn group_configuration(&self, repository: &Repository) -> Result<RepositoryGroupConfig> {
        let settings = repository
            .group_settings()
            .ok_or_else(|| kind_mismatch(repository, "group"))?;
        let mut config = RepositoryGroupConfig::new(
            repository.id().as_str(),
            settings.members.iter().map(|m| m.to_string()).collect(),
        );
        config.name = repository.name().to_string();
        config.repository_type = repository.repository_type();
        config.layout = repository.layout().to_string();
        config.location = Some(self.location_string(repository.location()));
        config.merged_index_ttl_minutes = settings.merged_index_ttl.as_secs() / 60;
        config.merged_index_path = settings.merged_index_path.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_repo_core::{FeatureKind, RepositoryKind};

    #[test]
    fn test_managed_round_trip() {
        let base = tempfile::tempdir().unwrap();
        let provider = MavenRepositoryProvider::new(base.path());
        let mut config = ManagedRepositoryConfig::new("internal", "repos/internal");
        config.snapshots = true;
        config.stage_repo_needed = true;
        config.scan_interval_secs = Some(300);

        let repository = provider.create_managed_instance(&config).unwrap();
        assert_eq!(repository.kind(), RepositoryKind::Managed);
        assert_eq!(
            repository.location().to_file_path().unwrap(),
            base.path().join("repos/internal")
        );
        assert!(repository.supports_release_scheme(ReleaseScheme::Snapshot));
        assert!(repository.supports_feature(FeatureKind::ArtifactCleanup));
        assert!(!repository.supports_feature(FeatureKind::RemoteIndex));
        assert_eq!(
            repository
                .features()
                .staging()
                .and_then(|s| s.staging_repository.as_ref())
                .map(|id| id.as_str()),
            Some("internal-stage")
        );

        let back = provider.managed_configuration(&repository).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_url_locations_kept() {
        let provider = MavenRepositoryProvider::new("/srv/repos");
        let config = ManagedRepositoryConfig::new("scratch", "mem:scratch");
        let repository = provider.create_managed_instance(&config).unwrap();
        assert_eq!(repository.location().as_str(), "mem:scratch");
        assert_eq!(provider.managed_configuration(&repository).unwrap().location, "mem:scratch");
    }

    #[test]
    fn test_remote_and_group() {
        let provider = MavenRepositoryProvider::new("/srv/repos");
        let remote = RemoteRepositoryConfig::new("central", "https://repo.example.org/maven2/");
        let repository = provider.create_remote_instance(&remote).unwrap();
        assert_eq!(
            repository.remote_settings().unwrap().timeout,
            Duration::from_secs(60)
        );
        assert_eq!(provider.remote_configuration(&repository).unwrap(), remote);
        assert!(provider.managed_configuration(&repository).is_err());

        let group = RepositoryGroupConfig::new("public", vec!["a".into(), "b".into()]);
        let repository = provider.create_repository_group(&group).unwrap();
        let settings = repository.group_settings().unwrap();
        assert_eq!(settings.members.len(), 2);
        assert_eq!(settings.merged_index_ttl, Duration::from_secs(30 * 60));
        assert!(repository.location().as_str().ends_with("/srv/repos/public/"));
    }

    #[test]
    fn test_invalid_id_rejected() {
        let provider = MavenRepositoryProvider::new("/srv/repos");
        let config = ManagedRepositoryConfig::new("bad id", "x");
        assert!(provider
            .create_managed_instance(&config)
            .unwrap_err()
            .is_invalid_argument());
    }
}
