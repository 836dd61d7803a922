//! Configuration validation
//!
//! Checkers inspect a configuration record against the current registry
//! configuration and collect every field error instead of stopping at the
//! first one. `put_*_with_check` on the registry refuses to register anything
//! unless the result is valid.

use artifact_repo_core::{
    layout_for, ManagedRepositoryConfig, RegistryConfiguration, RemoteRepositoryConfig,
    RepositoryError, RepositoryGroupConfig, RepositoryId, Result, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

/// Outcome of a configuration check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>, code: &str) {
        self.valid = false;
        self.errors.push(ValidationError::new(field, message, code));
    }

    pub fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// `ValidationFailed` carrying every error, unless valid
    pub fn into_result(self) -> Result<Vec<ValidationWarning>> {
        if self.valid {
            Ok(self.warnings)
        } else {
            Err(RepositoryError::ValidationFailed(self.errors))
        }
    }
}

/// Pluggable configuration check
pub trait RepositoryChecker<C>: Send + Sync {
    /// Check `config` as it would be stored into `existing`
    fn check(&self, config: &C, existing: &RegistryConfiguration) -> ValidationResult;
}

/// Built-in checks for all repository kinds
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRepositoryChecker;

impl DefaultRepositoryChecker {
    pub fn new() -> Self {
        Self
    }

    fn check_common(
        &self,
        result: &mut ValidationResult,
        id: &str,
        layout: &str,
        taken_by_other_kind: bool,
    ) {
        if let Err(e) = RepositoryId::new(id) {
            result.error("id", e.to_string(), "INVALID_ID");
        }
        if taken_by_other_kind {
            result.error(
                "id",
                format!("Id '{}' is already used by a repository of another kind", id),
                "ID_IN_USE",
            );
        }
        if layout_for(layout).is_none() {
            result.error(
                "layout",
                format!("Unknown repository layout '{}'", layout),
                "UNKNOWN_LAYOUT",
            );
        }
    }
}

fn check_location(result: &mut ValidationResult, field: &str, location: &str) {
    if location.trim().is_empty() {
        result.error(field, "Location cannot be empty", "LOCATION_EMPTY");
    } else if location.contains("..") {
        result.error(
            field,
            format!("Location '{}' may not contain '..'", location),
            "LOCATION_INVALID",
        );
    }
}

impl RepositoryChecker<ManagedRepositoryConfig> for DefaultRepositoryChecker {
    fn check(
        &self,
        config: &ManagedRepositoryConfig,
        existing: &RegistryConfiguration,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let other_kind = existing.find_remote(&config.id).is_some()
            || existing.find_group(&config.id).is_some();
        self.check_common(&mut result, &config.id, &config.layout, other_kind);

        check_location(&mut result, "location", &config.location);
        if !config.releases && !config.snapshots {
            result.error(
                "releases",
                "Repository must accept releases, snapshots or both",
                "NO_RELEASE_SCHEME",
            );
        }
        if config.retention_count == 0 {
            result.error(
                "retention_count",
                "Retention count must be at least 1",
                "RETENTION_COUNT_INVALID",
            );
        }
        if config.retention_period_days == 0 {
            result.warning(
                "retention_period_days",
                "Snapshots become eligible for purge immediately",
            );
        }
        if config.scan_interval_secs == Some(0) {
            result.error(
                "scan_interval_secs",
                "Scan interval must be positive",
                "SCAN_INTERVAL_INVALID",
            );
        }
        for (idx, location) in config.failover_locations.iter().enumerate() {
            check_location(&mut result, &format!("failover_locations[{}]", idx), location);
        }
        if config.index_path.trim().is_empty() {
            result.error("index_path", "Index path cannot be empty", "INDEX_PATH_EMPTY");
        }
        result
    }
}

impl RepositoryChecker<RemoteRepositoryConfig> for DefaultRepositoryChecker {
    fn check(
        &self,
        config: &RemoteRepositoryConfig,
        existing: &RegistryConfiguration,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let other_kind = existing.find_managed(&config.id).is_some()
            || existing.find_group(&config.id).is_some();
        self.check_common(&mut result, &config.id, &config.layout, other_kind);

        match Url::parse(&config.url) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https" | "file" | "mem") {
                    result.error(
                        "url",
                        format!("Unsupported URL scheme '{}'", url.scheme()),
                        "URL_SCHEME",
                    );
                } else if matches!(url.scheme(), "http" | "https") {
                    result.warning("url", "Remote is not locally reachable; proxy fetches will miss");
                }
            }
            Err(e) => result.error("url", format!("Invalid URL: {}", e), "URL_INVALID"),
        }
        if config.timeout_secs == 0 {
            result.error("timeout_secs", "Timeout must be positive", "TIMEOUT_INVALID");
        }
        if let Some(ref url) = config.remote_index_url {
            if url.trim().is_empty() {
                result.error(
                    "remote_index_url",
                    "Remote index URL cannot be empty if specified",
                    "INDEX_URL_EMPTY",
                );
            }
        }
        result
    }
}

impl RepositoryChecker<RepositoryGroupConfig> for DefaultRepositoryChecker {
    fn check(
        &self,
        config: &RepositoryGroupConfig,
        existing: &RegistryConfiguration,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let other_kind = existing.find_managed(&config.id).is_some()
            || existing.find_remote(&config.id).is_some();
        self.check_common(&mut result, &config.id, &config.layout, other_kind);

        if config.members.is_empty() {
            result.warning("members", "Group has no members");
        }
        let mut seen = HashSet::new();
        for (idx, member) in config.members.iter().enumerate() {
            let field = format!("members[{}]", idx);
            if member == &config.id {
                result.error(field, "A group cannot contain itself", "MEMBER_SELF");
                continue;
            }
            if !seen.insert(member.as_str()) {
                result.error(field, format!("Duplicate member '{}'", member), "MEMBER_DUPLICATE");
                continue;
            }
            match existing.find_managed(member) {
                Some(managed) if managed.layout != config.layout => result.warning(
                    field,
                    format!(
                        "Member '{}' uses layout '{}', group uses '{}'",
                        member, managed.layout, config.layout
                    ),
                ),
                Some(_) => {}
                None => result.error(
                    field,
                    format!("Member '{}' is not a managed repository", member),
                    "MEMBER_UNKNOWN",
                ),
            }
        }
        if config.merged_index_ttl_minutes == 0 {
            result.error(
                "merged_index_ttl_minutes",
                "Merged index TTL must be positive",
                "TTL_INVALID",
            );
        }
        if let Some(ref location) = config.location {
            check_location(&mut result, "location", location);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_errors_collected() {
        let checker = DefaultRepositoryChecker::new();
        let mut config = ManagedRepositoryConfig::new("bad id", "");
        config.layout = "p2".to_string();
        config.releases = false;
        config.retention_count = 0;

        let result = checker.check(&config, &RegistryConfiguration::default());
        assert!(!result.valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["id", "layout", "location", "releases", "retention_count"]
        );

        let err = result.into_result().unwrap_err();
        assert_eq!(err.validation_errors().len(), 5);
    }

    #[test]
    fn test_id_unique_across_kinds() {
        let checker = DefaultRepositoryChecker::new();
        let mut existing = RegistryConfiguration::default();
        existing.upsert_remote(RemoteRepositoryConfig::new("central", "https://repo.example.org/"));

        let managed = ManagedRepositoryConfig::new("central", "central");
        let result = checker.check(&managed, &existing);
        assert_eq!(result.errors[0].code.as_deref(), Some("ID_IN_USE"));

        // Replacing an entry of the same kind is fine
        let remote = RemoteRepositoryConfig::new("central", "mem:central");
        assert!(checker.check(&remote, &existing).valid);
    }

    #[test]
    fn test_group_members() {
        let checker = DefaultRepositoryChecker::new();
        let mut existing = RegistryConfiguration::default();
        existing.upsert_managed(ManagedRepositoryConfig::new("a", "a"));
        existing.upsert_remote(RemoteRepositoryConfig::new("central", "mem:central"));

        let group = RepositoryGroupConfig::new(
            "public",
            vec!["a".into(), "a".into(), "central".into(), "public".into()],
        );
        let result = checker.check(&group, &existing);
        let codes: Vec<&str> = result
            .errors
            .iter()
            .filter_map(|e| e.code.as_deref())
            .collect();
        assert_eq!(codes, vec!["MEMBER_DUPLICATE", "MEMBER_UNKNOWN", "MEMBER_SELF"]);

        let empty = RepositoryGroupConfig::new("empty", Vec::new());
        let result = checker.check(&empty, &existing);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_remote_url_checks() {
        let checker = DefaultRepositoryChecker::new();
        let mut config = RemoteRepositoryConfig::new("central", "ftp://repo.example.org/");
        config.timeout_secs = 0;
        let result = checker.check(&config, &RegistryConfiguration::default());
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["url", "timeout_secs"]);
    }
}
