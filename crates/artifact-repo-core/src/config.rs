//! Persisted repository configuration records
//!
//! These records are the single source of truth the registry reconciles its
//! in-memory state with. They are flat so they serialize cleanly as TOML
//! arrays of tables.

use serde::{Deserialize, Serialize};

use crate::layout::DEFAULT_LAYOUT;
use crate::types::RepositoryType;

fn default_layout() -> String {
    DEFAULT_LAYOUT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_retention_period() -> u32 {
    100
}

fn default_retention_count() -> u32 {
    2
}

fn default_timeout() -> u64 {
    60
}

fn default_merged_index_ttl() -> u64 {
    30
}

fn default_merged_index_path() -> String {
    ".indexer".to_string()
}

fn default_index_path() -> String {
    ".indexer".to_string()
}

/// Managed (local, writable) repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedRepositoryConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repository_type: RepositoryType,
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Storage location; relative paths resolve against the base directory
    pub location: String,
    #[serde(default = "default_true")]
    pub releases: bool,
    #[serde(default)]
    pub snapshots: bool,
    #[serde(default = "default_true")]
    pub block_redeployments: bool,
    /// Scan interval in seconds; no scanning when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failover_locations: Vec<String>,
    #[serde(default)]
    pub skip_packed_index: bool,
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default)]
    pub stage_repo_needed: bool,
    #[serde(default = "default_retention_period")]
    pub retention_period_days: u32,
    #[serde(default = "default_retention_count")]
    pub retention_count: u32,
    #[serde(default)]
    pub delete_released_snapshots: bool,
}

impl ManagedRepositoryConfig {
    /// Configuration with defaults for everything but id and location
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            repository_type: RepositoryType::default(),
            layout: default_layout(),
            location: location.into(),
            releases: true,
            snapshots: false,
            block_redeployments: true,
            scan_interval_secs: None,
            failover_locations: Vec::new(),
            skip_packed_index: false,
            index_path: default_index_path(),
            stage_repo_needed: false,
            retention_period_days: default_retention_period(),
            retention_count: default_retention_count(),
            delete_released_snapshots: false,
        }
    }
}

/// Remote (proxied) repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepositoryConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repository_type: RepositoryType,
    #[serde(default = "default_layout")]
    pub layout: String,
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Path probed to check reachability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_path: Option<String>,
    #[serde(default)]
    pub download_remote_index: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_index_url: Option<String>,
}

impl RemoteRepositoryConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            repository_type: RepositoryType::default(),
            layout: default_layout(),
            url: url.into(),
            timeout_secs: default_timeout(),
            check_path: None,
            download_remote_index: false,
            remote_index_url: None,
        }
    }
}

/// Ordered virtual view over managed repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryGroupConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repository_type: RepositoryType,
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Location for merged index output; defaults to `<base>/<id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Member ids in priority order
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default = "default_merged_index_ttl")]
    pub merged_index_ttl_minutes: u64,
    #[serde(default = "default_merged_index_path")]
    pub merged_index_path: String,
}

impl RepositoryGroupConfig {
    pub fn new(id: impl Into<String>, members: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            repository_type: RepositoryType::default(),
            layout: default_layout(),
            location: None,
            members,
            merged_index_ttl_minutes: default_merged_index_ttl(),
            merged_index_path: default_merged_index_path(),
        }
    }
}

/// Links a managed repository to a remote repository it proxies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConnectorConfig {
    pub source_repo_id: String,
    pub target_repo_id: String,
    /// Lower values are consulted first
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub disabled: bool,
}

impl ProxyConnectorConfig {
    pub fn new(source_repo_id: impl Into<String>, target_repo_id: impl Into<String>) -> Self {
        Self {
            source_repo_id: source_repo_id.into(),
            target_repo_id: target_repo_id.into(),
            order: 0,
            disabled: false,
        }
    }

    pub fn references(&self, id: &str) -> bool {
        self.source_repo_id == id || self.target_repo_id == id
    }
}

/// Complete persisted registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryConfiguration {
    #[serde(default)]
    pub managed_repositories: Vec<ManagedRepositoryConfig>,
    #[serde(default)]
    pub remote_repositories: Vec<RemoteRepositoryConfig>,
    #[serde(default)]
    pub repository_groups: Vec<RepositoryGroupConfig>,
    #[serde(default)]
    pub proxy_connectors: Vec<ProxyConnectorConfig>,
}

impl RegistryConfiguration {
    pub fn find_managed(&self, id: &str) -> Option<&ManagedRepositoryConfig> {
        self.managed_repositories.iter().find(|c| c.id == id)
    }

    pub fn find_remote(&self, id: &str) -> Option<&RemoteRepositoryConfig> {
        self.remote_repositories.iter().find(|c| c.id == id)
    }

    pub fn find_group(&self, id: &str) -> Option<&RepositoryGroupConfig> {
        self.repository_groups.iter().find(|c| c.id == id)
    }

    /// Whether any repository of any kind uses `id`
    pub fn contains_id(&self, id: &str) -> bool {
        self.find_managed(id).is_some() || self.find_remote(id).is_some() || self.find_group(id).is_some()
    }

    /// Insert or replace, keeping the position of an existing entry
    pub fn upsert_managed(&mut self, config: ManagedRepositoryConfig) -> Option<ManagedRepositoryConfig> {
        upsert(&mut self.managed_repositories, config, |c| c.id.clone())
    }

    pub fn upsert_remote(&mut self, config: RemoteRepositoryConfig) -> Option<RemoteRepositoryConfig> {
        upsert(&mut self.remote_repositories, config, |c| c.id.clone())
    }

    pub fn upsert_group(&mut self, config: RepositoryGroupConfig) -> Option<RepositoryGroupConfig> {
        upsert(&mut self.repository_groups, config, |c| c.id.clone())
    }

    pub fn remove_managed(&mut self, id: &str) -> Option<ManagedRepositoryConfig> {
        remove(&mut self.managed_repositories, |c| c.id == id)
    }

    pub fn remove_remote(&mut self, id: &str) -> Option<RemoteRepositoryConfig> {
        remove(&mut self.remote_repositories, |c| c.id == id)
    }

    pub fn remove_group(&mut self, id: &str) -> Option<RepositoryGroupConfig> {
        remove(&mut self.repository_groups, |c| c.id == id)
    }

    /// Drop `id` from every group member list. Returns the ids of the changed groups.
    pub fn remove_group_memberships(&mut self, id: &str) -> Vec<String> {
        let mut changed = Vec::new();
        for group in &mut self.repository_groups {
            let before = group.members.len();
            group.members.retain(|m| m != id);
            if group.members.len() != before {
                changed.push(group.id.clone());
            }
        }
        changed
    }

    /// Drop proxy connectors with `id` on either end. Returns how many were removed.
    pub fn remove_proxy_connectors(&mut self, id: &str) -> usize {
        let before = self.proxy_connectors.len();
        self.proxy_connectors.retain(|c| !c.references(id));
        before - self.proxy_connectors.len()
    }

    /// Enabled connectors of a managed repository, ordered
    pub fn connectors_for(&self, source_id: &str) -> Vec<&ProxyConnectorConfig> {
        let mut connectors: Vec<&ProxyConnectorConfig> = self
            .proxy_connectors
            .iter()
            .filter(|c| c.source_repo_id == source_id && !c.disabled)
            .collect();
        connectors.sort_by_key(|c| c.order);
        connectors
    }
}

fn upsert<T, F>(entries: &mut Vec<T>, entry: T, key: F) -> Option<T>
where
    F: Fn(&T) -> String,
{
    let id = key(&entry);
    match entries.iter().position(|e| key(e) == id) {
        Some(idx) => Some(std::mem::replace(&mut entries[idx], entry)),
        None => {
            entries.push(entry);
            None
        }
    }
}

fn remove<T, F>(entries: &mut Vec<T>, matches: F) -> Option<T>
where
    F: Fn(&T) -> bool,
{
    entries
        .iter()
        .position(matches)
        .map(|idx| entries.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: ManagedRepositoryConfig =
            serde_json::from_str(r#"{"id":"internal","location":"repos/internal"}"#).unwrap();
        assert_eq!(config.layout, "default");
        assert_eq!(config.repository_type, RepositoryType::Maven);
        assert!(config.releases);
        assert!(!config.snapshots);
        assert!(config.block_redeployments);
        assert_eq!(config.retention_period_days, 100);
        assert_eq!(config.retention_count, 2);

        let group: RepositoryGroupConfig = serde_json::from_str(r#"{"id":"g"}"#).unwrap();
        assert_eq!(group.merged_index_ttl_minutes, 30);
        let remote: RemoteRepositoryConfig =
            serde_json::from_str(r#"{"id":"central","url":"https://repo.example.org/"}"#).unwrap();
        assert_eq!(remote.timeout_secs, 60);
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut config = RegistryConfiguration::default();
        assert!(config.upsert_managed(ManagedRepositoryConfig::new("a", "a")).is_none());
        config.upsert_managed(ManagedRepositoryConfig::new("b", "b"));
        let mut updated = ManagedRepositoryConfig::new("a", "elsewhere");
        updated.snapshots = true;
        let old = config.upsert_managed(updated).unwrap();
        assert_eq!(old.location, "a");
        assert_eq!(config.managed_repositories[0].location, "elsewhere");
        assert_eq!(config.managed_repositories.len(), 2);
    }

    #[test]
    fn test_reference_cleanup() {
        let mut config = RegistryConfiguration::default();
        config.upsert_group(RepositoryGroupConfig::new("g1", vec!["a".into(), "b".into()]));
        config.upsert_group(RepositoryGroupConfig::new("g2", vec!["b".into()]));
        config.proxy_connectors.push(ProxyConnectorConfig::new("a", "central"));
        config.proxy_connectors.push(ProxyConnectorConfig::new("b", "central"));

        assert_eq!(config.remove_group_memberships("a"), vec!["g1".to_string()]);
        assert_eq!(config.find_group("g1").unwrap().members, vec!["b".to_string()]);
        assert_eq!(config.remove_proxy_connectors("central"), 2);
        assert!(config.proxy_connectors.is_empty());
    }

    #[test]
    fn test_connectors_ordered_and_enabled() {
        let mut config = RegistryConfiguration::default();
        let mut second = ProxyConnectorConfig::new("internal", "mirror");
        second.order = 2;
        let mut first = ProxyConnectorConfig::new("internal", "central");
        first.order = 1;
        let mut disabled = ProxyConnectorConfig::new("internal", "old");
        disabled.disabled = true;
        config.proxy_connectors = vec![second, first, disabled];
        let targets: Vec<&str> = config
            .connectors_for("internal")
            .iter()
            .map(|c| c.target_repo_id.as_str())
            .collect();
        assert_eq!(targets, vec!["central", "mirror"]);
    }
}
