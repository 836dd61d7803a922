//! Repository instances
//!
//! A [`Repository`] is an immutable configuration and capability object plus
//! a lifecycle state. The three kinds (managed, remote, group) share the
//! [`RepositoryCapabilities`] struct and differ in their [`RepositoryVariant`].
//! Reconfiguration always produces a new instance; registries and caches key
//! on instance identity to notice structural changes.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::{RepositoryError, Result};
use crate::feature::{FeatureKind, FeatureMap};
use crate::types::{LifecycleState, ReleaseScheme, RepositoryId, RepositoryKind, RepositoryType};

/// Capabilities shared by every repository kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCapabilities {
    pub repository_type: RepositoryType,
    /// Layout identifier (`default`, `legacy`)
    pub layout: String,
    pub release_schemes: BTreeSet<ReleaseScheme>,
    pub features: FeatureMap,
}

impl RepositoryCapabilities {
    pub fn new(repository_type: RepositoryType, layout: impl Into<String>) -> Self {
        Self {
            repository_type,
            layout: layout.into(),
            release_schemes: BTreeSet::new(),
            features: FeatureMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedSettings {
    pub block_redeployments: bool,
    /// Background scanning interval; `None` disables scanning
    pub scan_interval: Option<Duration>,
    pub failover_locations: Vec<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Transport timeout applied to proxy fetches
    pub timeout: Duration,
    pub check_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSettings {
    /// Member ids in priority order
    pub members: Vec<RepositoryId>,
    pub merged_index_ttl: Duration,
    pub merged_index_path: String,
}

/// Kind-specific part of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryVariant {
    Managed(ManagedSettings),
    Remote(RemoteSettings),
    Group(GroupSettings),
}

/// A repository instance
pub struct Repository {
    id: RepositoryId,
    name: String,
    location: Url,
    capabilities: RepositoryCapabilities,
    variant: RepositoryVariant,
    state: Mutex<LifecycleState>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("location", &self.location.as_str())
            .field("layout", &self.capabilities.layout)
            .field("state", &self.state())
            .finish()
    }
}

impl Repository {
    /// New, unregistered instance
    pub fn new(
        id: RepositoryId,
        name: impl Into<String>,
        location: Url,
        capabilities: RepositoryCapabilities,
        variant: RepositoryVariant,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            capabilities,
            variant,
            state: Mutex::new(LifecycleState::Unregistered),
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn capabilities(&self) -> &RepositoryCapabilities {
        &self.capabilities
    }

    pub fn variant(&self) -> &RepositoryVariant {
        &self.variant
    }

    pub fn repository_type(&self) -> RepositoryType {
        self.capabilities.repository_type
    }

    pub fn layout(&self) -> &str {
        &self.capabilities.layout
    }

    pub fn kind(&self) -> RepositoryKind {
        match self.variant {
            RepositoryVariant::Managed(_) => RepositoryKind::Managed,
            RepositoryVariant::Remote(_) => RepositoryKind::Remote,
            RepositoryVariant::Group(_) => RepositoryKind::Group,
        }
    }

    pub fn managed_settings(&self) -> Option<&ManagedSettings> {
        match &self.variant {
            RepositoryVariant::Managed(s) => Some(s),
            _ => None,
        }
    }

    pub fn remote_settings(&self) -> Option<&RemoteSettings> {
        match &self.variant {
            RepositoryVariant::Remote(s) => Some(s),
            _ => None,
        }
    }

    pub fn group_settings(&self) -> Option<&GroupSettings> {
        match &self.variant {
            RepositoryVariant::Group(s) => Some(s),
            _ => None,
        }
    }

    pub fn supports_release_scheme(&self, scheme: ReleaseScheme) -> bool {
        self.capabilities.release_schemes.contains(&scheme)
    }

    /// Only managed repositories can block redeployment
    pub fn blocks_redeployments(&self) -> bool {
        self.managed_settings()
            .map(|s| s.block_redeployments)
            .unwrap_or(false)
    }

    pub fn supports_feature(&self, kind: FeatureKind) -> bool {
        self.capabilities.features.supports(kind)
    }

    pub fn features(&self) -> &FeatureMap {
        &self.capabilities.features
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Activated
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState> {
        let mut state = self.state.lock();
        let current = *state;
        if current == next {
            return Ok(current);
        }
        if !current.can_transition_to(next) {
            return Err(RepositoryError::InvalidState(format!(
                "Repository '{}' cannot move from {} to {}",
                self.id, current, next
            )));
        }
        *state = next;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed(block: bool) -> Repository {
        let mut capabilities = RepositoryCapabilities::new(RepositoryType::Maven, "default");
        capabilities.release_schemes.insert(ReleaseScheme::Release);
        Repository::new(
            RepositoryId::new("internal").unwrap(),
            "Internal",
            Url::parse("mem:internal").unwrap(),
            capabilities,
            RepositoryVariant::Managed(ManagedSettings {
                block_redeployments: block,
                scan_interval: None,
                failover_locations: Vec::new(),
            }),
        )
    }

    #[test]
    fn test_capability_queries() {
        let repo = managed(true);
        assert_eq!(repo.kind(), RepositoryKind::Managed);
        assert!(repo.blocks_redeployments());
        assert!(repo.supports_release_scheme(ReleaseScheme::Release));
        assert!(!repo.supports_release_scheme(ReleaseScheme::Snapshot));
        assert!(!repo.supports_feature(FeatureKind::Staging));
        assert!(repo.group_settings().is_none());
    }

    #[test]
    fn test_lifecycle() {
        let repo = managed(false);
        assert_eq!(repo.state(), LifecycleState::Unregistered);
        assert!(repo.transition(LifecycleState::Activated).is_err());
        repo.transition(LifecycleState::Registered).unwrap();
        repo.transition(LifecycleState::Activated).unwrap();
        assert!(repo.is_active());
        assert_eq!(
            repo.transition(LifecycleState::Removed).unwrap(),
            LifecycleState::Activated
        );
        assert!(matches!(
            repo.transition(LifecycleState::Registered),
            Err(RepositoryError::InvalidState(_))
        ));
    }
}
