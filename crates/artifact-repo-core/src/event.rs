//! Registry lifecycle events and content audit events
//!
//! [`RepositoryEvent`]s are published by the registry on lifecycle
//! transitions; [`AuditEvent`]s are emitted by content operations that
//! create, modify, move or remove stored assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::types::RepositoryId;

/// Kinds of registry lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryEventType {
    /// A repository became the authoritative instance for its id
    Registered,
    /// A registered repository was replaced by a new configuration
    Updated,
    /// A repository was deregistered
    Removed,
    /// Content was wired and scanning started
    Activated,
    /// Content was detached and scanning stopped
    Deactivated,
    /// The whole registry was rebuilt from configuration
    Reloaded,
    /// Group members or proxy connectors changed because of another repository
    ReferencesUpdated,
}

impl RepositoryEventType {
    pub fn event_name(&self) -> &'static str {
        match self {
            RepositoryEventType::Registered => "repository_registered",
            RepositoryEventType::Updated => "repository_updated",
            RepositoryEventType::Removed => "repository_removed",
            RepositoryEventType::Activated => "repository_activated",
            RepositoryEventType::Deactivated => "repository_deactivated",
            RepositoryEventType::Reloaded => "registry_reloaded",
            RepositoryEventType::ReferencesUpdated => "references_updated",
        }
    }
}

impl fmt::Display for RepositoryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Immutable record of a registry lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    /// Unique, time-ordered event id
    pub id: Ulid,
    pub event_type: RepositoryEventType,
    /// Affected repository; `None` for registry-wide events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<RepositoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RepositoryEvent {
    /// Create an event for a repository with the current timestamp
    pub fn new(event_type: RepositoryEventType, repository_id: RepositoryId) -> Self {
        Self {
            id: Ulid::new(),
            event_type,
            repository_id: Some(repository_id),
            old_value: None,
            new_value: None,
            timestamp: Utc::now(),
        }
    }

    /// Registry-wide event
    pub fn registry(event_type: RepositoryEventType) -> Self {
        Self {
            id: Ulid::new(),
            event_type,
            repository_id: None,
            old_value: None,
            new_value: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_values(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn event_name(&self) -> &'static str {
        self.event_type.event_name()
    }
}

impl fmt::Display for RepositoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RepositoryEvent({} at {}",
            self.event_name(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if let Some(ref id) = self.repository_id {
            write!(f, ", repository={}", id)?;
        }
        write!(f, ")")
    }
}

/// Audited content actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateFile,
    UploadFile,
    CreateDir,
    RemoveFile,
    RemoveDir,
    MoveFile,
    CopyFile,
    ProxyFetch,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::CreateFile => "create_file",
            AuditAction::UploadFile => "upload_file",
            AuditAction::CreateDir => "create_dir",
            AuditAction::RemoveFile => "remove_file",
            AuditAction::RemoveDir => "remove_dir",
            AuditAction::MoveFile => "move_file",
            AuditAction::CopyFile => "copy_file",
            AuditAction::ProxyFetch => "proxy_fetch",
        };
        f.write_str(name)
    }
}

/// Structured audit record delivered to audit listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub repository_id: RepositoryId,
    pub principal: String,
    pub resource_path: String,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        repository_id: RepositoryId,
        principal: impl Into<String>,
        resource_path: impl Into<String>,
        action: AuditAction,
    ) -> Self {
        Self {
            repository_id,
            principal: principal.into(),
            resource_path: resource_path.into(),
            action,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}",
            self.principal, self.action, self.repository_id, self.resource_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryId {
        RepositoryId::new("internal").unwrap()
    }

    #[test]
    fn test_repository_event() {
        let event = RepositoryEvent::new(RepositoryEventType::Registered, repo())
            .with_values(None, Some("internal".into()));
        assert_eq!(event.event_name(), "repository_registered");
        assert!(event.to_string().contains("repository=internal"));
        assert_eq!(event.new_value.as_deref(), Some("internal"));
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = RepositoryEvent::registry(RepositoryEventType::Reloaded);
        let b = RepositoryEvent::registry(RepositoryEventType::Reloaded);
        assert_ne!(a.id, b.id);
        assert!(a.repository_id.is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = RepositoryEvent::new(RepositoryEventType::Removed, repo());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"removed\""));
        let parsed: RepositoryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_audit_event_display() {
        let event = AuditEvent::new(repo(), "admin", "com/example/foo", AuditAction::RemoveDir);
        assert_eq!(event.to_string(), "admin remove_dir internal:com/example/foo");
    }
}
