//! Core type definitions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{RepositoryError, Result};

/// Maximum length of a repository id
pub const MAX_REPOSITORY_ID_LENGTH: usize = 100;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"))
}

/// Repository identifier, unique across managed, remote and group repositories
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Create a validated repository id
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "Repository id cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_REPOSITORY_ID_LENGTH {
            return Err(RepositoryError::InvalidArgument(format!(
                "Repository id exceeds {} characters",
                MAX_REPOSITORY_ID_LENGTH
            )));
        }
        if !id_pattern().is_match(&id) {
            return Err(RepositoryError::InvalidArgument(format!(
                "Repository id '{}' may only contain letters, digits, '.', '_' and '-'",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryId {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        RepositoryId::new(s)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = RepositoryError;

    fn try_from(value: String) -> Result<Self> {
        RepositoryId::new(value)
    }
}

impl From<RepositoryId> for String {
    fn from(id: RepositoryId) -> Self {
        id.0
    }
}

impl AsRef<str> for RepositoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RepositoryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Repository content type. Selects the content provider together with the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepositoryType {
    /// Maven-style coordinates (group/artifact/version)
    #[default]
    Maven,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryType::Maven => write!(f, "MAVEN"),
        }
    }
}

impl FromStr for RepositoryType {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "MAVEN" => Ok(RepositoryType::Maven),
            _ => Err(RepositoryError::UnsupportedRepositoryType(s.to_string())),
        }
    }
}

/// Repository variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// Locally stored, writable repository
    Managed,
    /// Proxied remote repository
    Remote,
    /// Virtual merged view over managed repositories
    Group,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Managed => write!(f, "managed"),
            RepositoryKind::Remote => write!(f, "remote"),
            RepositoryKind::Group => write!(f, "group"),
        }
    }
}

/// Version forms a repository accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReleaseScheme {
    /// Final releases
    Release,
    /// Snapshot (development) versions
    Snapshot,
}

impl fmt::Display for ReleaseScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseScheme::Release => write!(f, "RELEASE"),
            ReleaseScheme::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

/// Lifecycle of a repository instance inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created but not registered
    #[default]
    Unregistered,
    /// Authoritative instance for its id
    Registered,
    /// Content wired, scanning started
    Activated,
    /// Content detached, scanning stopped
    Deactivated,
    /// Deregistered; terminal
    Removed,
}

impl LifecycleState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unregistered, Registered)
                | (Registered, Activated)
                | (Activated, Deactivated)
                | (Deactivated, Activated)
                | (Unregistered, Removed)
                | (Registered, Removed)
                | (Activated, Removed)
                | (Deactivated, Removed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unregistered => "unregistered",
            LifecycleState::Registered => "registered",
            LifecycleState::Activated => "activated",
            LifecycleState::Deactivated => "deactivated",
            LifecycleState::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_id_validation() {
        assert!(RepositoryId::new("internal").is_ok());
        assert!(RepositoryId::new("my.repo-1_a").is_ok());
        assert!(RepositoryId::new("").is_err());
        assert!(RepositoryId::new("has space").is_err());
        assert!(RepositoryId::new("slash/id").is_err());
        assert!(RepositoryId::new("a".repeat(101)).is_err());
    }

    #[test]
    fn test_repository_id_serde() {
        let id = RepositoryId::new("internal").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"internal\"");
        let parsed: RepositoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<RepositoryId>("\"bad id\"").is_err());
    }

    #[test]
    fn test_repository_type_parse() {
        assert_eq!("maven".parse::<RepositoryType>().unwrap(), RepositoryType::Maven);
        assert!(matches!(
            "npm".parse::<RepositoryType>(),
            Err(RepositoryError::UnsupportedRepositoryType(_))
        ));
    }

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Unregistered.can_transition_to(Registered));
        assert!(Registered.can_transition_to(Activated));
        assert!(Activated.can_transition_to(Deactivated));
        assert!(Deactivated.can_transition_to(Activated));
        assert!(Activated.can_transition_to(Removed));
        assert!(!Removed.can_transition_to(Registered));
        assert!(!Unregistered.can_transition_to(Activated));
    }
}
