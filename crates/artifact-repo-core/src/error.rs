//! Error types for the artifact repository engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field that failed validation (dotted path)
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Stable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ValidationError {
    /// Create a new validation error with a code
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: &str) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: Some(code.to_string()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Main error type for repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The selector or path is missing required coordinates or is malformed.
    /// Always raised before any storage access.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A well-formed item is not present
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// A well-formed path has no physical content
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Storage backend failure
    #[error("Content access failed for '{path}'{}: {source}", repository_suffix(.repository))]
    ContentAccess {
        /// Repository the access happened in, when known
        repository: Option<String>,
        /// Storage path
        path: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Operation is not representable in the repository layout
    #[error("Layout error: {0}")]
    Layout(String),

    /// No content provider exists for a (type, layout) pair
    #[error("Unsupported repository type: {0}")]
    UnsupportedRepositoryType(String),

    /// Write rejected by repository policy (redeployment, release scheme)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No repository registered under the id
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Configuration checks failed; carries every field error
    #[error("Validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    /// Illegal lifecycle transition or use of a detached object
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn repository_suffix(repository: &Option<String>) -> String {
    match repository {
        Some(id) => format!(" in repository '{}'", id),
        None => String::new(),
    }
}

impl RepositoryError {
    /// Build a content access error from an I/O failure
    pub fn access(path: impl Into<String>, source: std::io::Error) -> Self {
        RepositoryError::ContentAccess {
            repository: None,
            path: path.into(),
            source,
        }
    }

    /// Attach repository context to access failures
    pub fn with_repository(self, id: &str) -> Self {
        match self {
            RepositoryError::ContentAccess {
                repository: None,
                path,
                source,
            } => RepositoryError::ContentAccess {
                repository: Some(id.to_string()),
                path,
                source,
            },
            other => other,
        }
    }

    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepositoryError::ItemNotFound(_)
                | RepositoryError::ContentNotFound(_)
                | RepositoryError::RepositoryNotFound(_)
        )
    }

    /// Check if this error is an invalid-argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RepositoryError::InvalidArgument(_))
    }

    /// Check if this error is a storage access failure
    pub fn is_access_failure(&self) -> bool {
        matches!(self, RepositoryError::ContentAccess { .. })
    }

    /// Validation errors carried by this error, if any
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            RepositoryError::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for RepositoryError {
    fn from(err: url::ParseError) -> Self {
        RepositoryError::InvalidArgument(format!("Invalid location: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_error_context() {
        let err = RepositoryError::access(
            "com/example/foo",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .with_repository("internal");

        assert!(err.is_access_failure());
        assert_eq!(
            err.to_string(),
            "Content access failed for 'com/example/foo' in repository 'internal': denied"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_with_repository_keeps_other_variants() {
        let err = RepositoryError::Layout("no versions".into()).with_repository("legacy");
        assert_eq!(err.to_string(), "Layout error: no versions");
    }

    #[test]
    fn test_validation_failed_display() {
        let err = RepositoryError::ValidationFailed(vec![
            ValidationError::new("id", "empty", "ID_EMPTY"),
            ValidationError::new("location", "empty", "LOCATION_EMPTY"),
        ]);
        assert_eq!(err.to_string(), "Validation failed with 2 error(s)");
        assert_eq!(err.validation_errors().len(), 2);
    }

    #[test]
    fn test_not_found_predicates() {
        assert!(RepositoryError::ItemNotFound("x".into()).is_not_found());
        assert!(RepositoryError::ContentNotFound("x".into()).is_not_found());
        assert!(!RepositoryError::InvalidArgument("x".into()).is_not_found());
    }
}
