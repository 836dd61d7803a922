//! Item selectors
//!
//! An [`ItemSelector`] is the immutable coordinate tuple used as the universal
//! query key against repository content. Every field is optional; the set of
//! populated fields decides the [`Granularity`] of the query. The value `"*"`
//! acts as a wildcard wherever a selector is used for matching.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RepositoryError, Result};

/// Wildcard value matching any coordinate
pub const WILDCARD: &str = "*";

/// Individual coordinate fields, used to report missing requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorField {
    Namespace,
    ProjectId,
    Version,
    ArtifactId,
    ArtifactVersion,
    Classifier,
    Type,
    Extension,
}

impl fmt::Display for SelectorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectorField::Namespace => "namespace",
            SelectorField::ProjectId => "projectId",
            SelectorField::Version => "version",
            SelectorField::ArtifactId => "artifactId",
            SelectorField::ArtifactVersion => "artifactVersion",
            SelectorField::Classifier => "classifier",
            SelectorField::Type => "type",
            SelectorField::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// The most specific item kind a selector addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    /// No coordinates at all
    None,
    Namespace,
    Project,
    Version,
    Artifact,
}

/// Immutable coordinate tuple
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSelector {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    artifact_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classifier: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "type",
        deserialize_with = "present_field"
    )]
    artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_field")]
    extension: Option<String>,
    #[serde(default)]
    recurse: bool,
    #[serde(default)]
    include_related_artifacts: bool,
}

/// Empty coordinates are stored as unset so equal tuples compare equal
fn present(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

fn present_field<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(present))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn field_matches(pattern: Option<&str>, value: &str) -> bool {
    match pattern {
        None => true,
        Some(WILDCARD) => true,
        Some(p) => p == value,
    }
}

impl ItemSelector {
    /// Start building a selector
    pub fn builder() -> ItemSelectorBuilder {
        ItemSelectorBuilder::default()
    }

    /// Selector with no coordinates
    pub fn empty() -> Self {
        Self::default()
    }

    /// Turn this selector back into a builder for derived selectors
    pub fn to_builder(&self) -> ItemSelectorBuilder {
        ItemSelectorBuilder {
            inner: self.clone(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        non_empty(&self.namespace)
    }

    pub fn project_id(&self) -> Option<&str> {
        non_empty(&self.project_id)
    }

    pub fn version(&self) -> Option<&str> {
        non_empty(&self.version)
    }

    pub fn artifact_id(&self) -> Option<&str> {
        non_empty(&self.artifact_id)
    }

    pub fn artifact_version(&self) -> Option<&str> {
        non_empty(&self.artifact_version)
    }

    /// Classifier; `Some("")` means explicitly no classifier
    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn artifact_type(&self) -> Option<&str> {
        non_empty(&self.artifact_type)
    }

    pub fn extension(&self) -> Option<&str> {
        non_empty(&self.extension)
    }

    pub fn recurse(&self) -> bool {
        self.recurse
    }

    pub fn include_related_artifacts(&self) -> bool {
        self.include_related_artifacts
    }

    pub fn has_namespace(&self) -> bool {
        self.namespace().is_some()
    }

    pub fn has_project_id(&self) -> bool {
        self.project_id().is_some()
    }

    pub fn has_version(&self) -> bool {
        self.version().is_some()
    }

    pub fn has_artifact_id(&self) -> bool {
        self.artifact_id().is_some()
    }

    pub fn has_artifact_version(&self) -> bool {
        self.artifact_version().is_some()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn has_type(&self) -> bool {
        self.artifact_type().is_some()
    }

    pub fn has_extension(&self) -> bool {
        self.extension().is_some()
    }

    fn has_field(&self, field: SelectorField) -> bool {
        match field {
            SelectorField::Namespace => self.has_namespace(),
            SelectorField::ProjectId => self.has_project_id(),
            SelectorField::Version => self.has_version(),
            SelectorField::ArtifactId => self.has_artifact_id(),
            SelectorField::ArtifactVersion => self.has_artifact_version(),
            SelectorField::Classifier => self.has_classifier(),
            SelectorField::Type => self.has_type(),
            SelectorField::Extension => self.has_extension(),
        }
    }

    /// Whether any artifact-level coordinate is present
    pub fn has_artifact_coordinates(&self) -> bool {
        self.has_artifact_id()
            || self.has_artifact_version()
            || self.has_classifier()
            || self.has_type()
            || self.has_extension()
    }

    /// Most specific item kind addressed by the populated fields
    pub fn granularity(&self) -> Granularity {
        if self.has_artifact_coordinates() {
            Granularity::Artifact
        } else if self.has_version() {
            Granularity::Version
        } else if self.has_project_id() {
            Granularity::Project
        } else if self.has_namespace() {
            Granularity::Namespace
        } else {
            Granularity::None
        }
    }

    /// Whether any field holds the wildcard
    pub fn is_wildcard(&self) -> bool {
        [
            &self.namespace,
            &self.project_id,
            &self.version,
            &self.artifact_id,
            &self.artifact_version,
            &self.classifier,
            &self.artifact_type,
            &self.extension,
        ]
        .iter()
        .any(|f| f.as_deref() == Some(WILDCARD))
    }

    /// Fail with an [`RepositoryError::InvalidArgument`] listing every
    /// missing field. Wildcards do not satisfy a requirement.
    pub fn require(&self, fields: &[SelectorField], operation: &str) -> Result<()> {
        let missing: Vec<String> = fields
            .iter()
            .filter(|f| !self.has_field(**f) || self.field_value(**f) == Some(WILDCARD))
            .map(|f| f.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::InvalidArgument(format!(
                "{} requires {} to be set on the selector",
                operation,
                missing.join(", ")
            )))
        }
    }

    fn field_value(&self, field: SelectorField) -> Option<&str> {
        match field {
            SelectorField::Namespace => self.namespace(),
            SelectorField::ProjectId => self.project_id(),
            SelectorField::Version => self.version(),
            SelectorField::ArtifactId => self.artifact_id(),
            SelectorField::ArtifactVersion => self.artifact_version(),
            SelectorField::Classifier => self.classifier(),
            SelectorField::Type => self.artifact_type(),
            SelectorField::Extension => self.extension(),
        }
    }

    /// Match artifact-level coordinates (unset and `*` match anything;
    /// a set classifier of `""` only matches artifacts without one)
    pub fn matches_artifact(
        &self,
        artifact_id: &str,
        artifact_version: &str,
        classifier: &str,
        extension: &str,
        artifact_type: &str,
    ) -> bool {
        field_matches(self.artifact_id(), artifact_id)
            && field_matches(self.artifact_version(), artifact_version)
            && field_matches(self.classifier(), classifier)
            && field_matches(self.extension(), extension)
            && field_matches(self.artifact_type(), artifact_type)
    }

    /// Match a version directory name
    pub fn matches_version(&self, version: &str) -> bool {
        field_matches(self.version(), version)
    }

    /// Match a project id
    pub fn matches_project(&self, project_id: &str) -> bool {
        field_matches(self.project_id(), project_id)
    }
}

impl fmt::Display for ItemSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            self.namespace(),
            self.project_id(),
            self.version(),
            self.artifact_id(),
            self.artifact_version(),
            self.classifier(),
            self.extension(),
        ];
        let rendered: Vec<&str> = parts.iter().map(|p| p.unwrap_or("")).collect();
        let trimmed = rendered
            .iter()
            .rposition(|p| !p.is_empty())
            .map(|last| &rendered[..=last])
            .unwrap_or(&[]);
        write!(f, "{}", trimmed.join(":"))
    }
}

/// Builder for [`ItemSelector`]
#[derive(Debug, Clone, Default)]
pub struct ItemSelectorBuilder {
    inner: ItemSelector,
}

impl ItemSelectorBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.inner.namespace = present(namespace.into());
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.inner.project_id = present(project_id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.inner.version = present(version.into());
        self
    }

    pub fn artifact_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.inner.artifact_id = present(artifact_id.into());
        self
    }

    pub fn artifact_version(mut self, artifact_version: impl Into<String>) -> Self {
        self.inner.artifact_version = present(artifact_version.into());
        self
    }

    pub fn classifier(mut self, classifier: impl Into<String>) -> Self {
        self.inner.classifier = Some(classifier.into());
        self
    }

    pub fn artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.inner.artifact_type = present(artifact_type.into());
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.inner.extension = present(extension.into());
        self
    }

    pub fn recurse(mut self, recurse: bool) -> Self {
        self.inner.recurse = recurse;
        self
    }

    pub fn include_related_artifacts(mut self, include: bool) -> Self {
        self.inner.include_related_artifacts = include;
        self
    }

    /// Drop every artifact-level field
    pub fn clear_artifact(mut self) -> Self {
        self.inner.artifact_id = None;
        self.inner.artifact_version = None;
        self.inner.classifier = None;
        self.inner.artifact_type = None;
        self.inner.extension = None;
        self
    }

    /// Drop the version and every artifact-level field
    pub fn clear_version(self) -> Self {
        let mut builder = self.clear_artifact();
        builder.inner.version = None;
        builder
    }

    pub fn build(self) -> ItemSelector {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_selector() -> ItemSelector {
        ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("1.0")
            .build()
    }

    #[test]
    fn test_granularity() {
        assert_eq!(ItemSelector::empty().granularity(), Granularity::None);
        assert_eq!(
            ItemSelector::builder().namespace("com").build().granularity(),
            Granularity::Namespace
        );
        assert_eq!(version_selector().granularity(), Granularity::Version);
        let artifact = version_selector().to_builder().extension("jar").build();
        assert_eq!(artifact.granularity(), Granularity::Artifact);
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let selector = ItemSelector::builder().namespace("").project_id("foo").build();
        assert!(!selector.has_namespace());
        assert_eq!(selector.granularity(), Granularity::Project);
    }

    #[test]
    fn test_empty_strings_compare_as_unset() {
        use std::collections::HashSet;
        let with_empty = version_selector().to_builder().extension("").artifact_id("").build();
        assert_eq!(with_empty, version_selector());
        let mut set = HashSet::new();
        set.insert(with_empty);
        set.insert(version_selector());
        assert_eq!(set.len(), 1);

        let parsed: ItemSelector = serde_json::from_str(
            r#"{"namespace":"com.example","projectId":"foo","version":"1.0","type":""}"#,
        )
        .unwrap();
        assert_eq!(parsed, version_selector());

        // An explicit empty classifier still means "no classifier"
        let no_classifier = version_selector().to_builder().classifier("").build();
        assert_ne!(no_classifier, version_selector());
    }

    #[test]
    fn test_require_lists_all_missing_fields() {
        let selector = ItemSelector::builder().project_id("foo").build();
        let err = selector
            .require(
                &[SelectorField::Namespace, SelectorField::ProjectId, SelectorField::Version],
                "getVersion",
            )
            .unwrap_err();
        let message = err.to_string();
        assert!(err.is_invalid_argument());
        assert!(message.contains("namespace"));
        assert!(message.contains("version"));
        assert!(!message.contains("projectId"));
    }

    #[test]
    fn test_require_rejects_wildcards() {
        let selector = ItemSelector::builder().namespace("*").build();
        assert!(selector.require(&[SelectorField::Namespace], "op").is_err());
    }

    #[test]
    fn test_equality_and_hash_by_tuple() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(version_selector());
        set.insert(version_selector());
        assert_eq!(set.len(), 1);
        assert_ne!(version_selector(), version_selector().to_builder().recurse(true).build());
    }

    #[test]
    fn test_matches_artifact_with_wildcards() {
        let selector = version_selector()
            .to_builder()
            .classifier("*")
            .extension("jar")
            .build();
        assert!(selector.matches_artifact("foo", "1.0", "sources", "jar", "java-source"));
        assert!(!selector.matches_artifact("foo", "1.0", "", "pom", "pom"));

        let no_classifier = version_selector().to_builder().classifier("").build();
        assert!(no_classifier.matches_artifact("foo", "1.0", "", "jar", "jar"));
        assert!(!no_classifier.matches_artifact("foo", "1.0", "tests", "jar", "test-jar"));
        assert!(selector.is_wildcard());
    }

    #[test]
    fn test_display() {
        assert_eq!(version_selector().to_string(), "com.example:foo:1.0");
    }

    #[test]
    fn test_builder_clear() {
        let artifact = version_selector().to_builder().artifact_id("foo").extension("jar").build();
        let version = artifact.to_builder().clear_artifact().build();
        assert_eq!(version, version_selector());
        let project = artifact.to_builder().clear_version().build();
        assert_eq!(project.granularity(), Granularity::Project);
    }
}
