//! Repository layouts
//!
//! A layout is the convention mapping logical coordinates to storage paths.
//! Layouts are pure: they never touch storage, so they can be shared freely
//! between repositories and threads.
//!
//! Two primitive operations define a layout: [`RepositoryLayout::to_path`]
//! and [`RepositoryLayout::to_item_selector`]. They are not exact inverses,
//! since a path may underspecify a selector, but
//! `to_path(to_item_selector(p)) == p` holds for every artifact path a layout
//! produces.

mod legacy;
mod maven2;

pub use legacy::LegacyLayout;
pub use maven2::Maven2Layout;

use std::fmt;
use std::sync::Arc;

use crate::error::{RepositoryError, Result};
use crate::item::{ArtifactCoordinates, ItemKind};
use crate::selector::{Granularity, ItemSelector, WILDCARD};
use crate::version;

/// Identifier of the Maven 2 layout
pub const DEFAULT_LAYOUT: &str = "default";
/// Identifier of the legacy flat layout
pub const LEGACY_LAYOUT: &str = "legacy";

/// Optional layout features queried before layout-specific operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutCapability {
    /// Versions live in their own containers
    VersionContainers,
    /// Project level metadata documents
    ProjectMetadata,
    /// Gathering artifacts that share a version container
    RelatedArtifacts,
    /// Timestamped snapshot builds inside `-SNAPSHOT` containers
    SnapshotTimestamps,
}

impl fmt::Display for LayoutCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayoutCapability::VersionContainers => "version containers",
            LayoutCapability::ProjectMetadata => "project metadata",
            LayoutCapability::RelatedArtifacts => "related artifacts",
            LayoutCapability::SnapshotTimestamps => "snapshot timestamps",
        };
        f.write_str(name)
    }
}

/// Bidirectional coordinate/path mapping for one layout convention
pub trait RepositoryLayout: Send + Sync + fmt::Debug {
    /// Layout identifier as used in repository configuration
    fn id(&self) -> &'static str;

    fn supports(&self, capability: LayoutCapability) -> bool;

    /// Fail with a layout error when `capability` is unsupported
    fn require(&self, capability: LayoutCapability) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(RepositoryError::Layout(format!(
                "The '{}' layout does not support {}",
                self.id(),
                capability
            )))
        }
    }

    fn namespace_path(&self, selector: &ItemSelector) -> Result<String>;

    fn project_path(&self, selector: &ItemSelector) -> Result<String>;

    fn version_path(&self, selector: &ItemSelector) -> Result<String>;

    /// Path of the metadata document for the selector's granularity
    fn metadata_path(&self, selector: &ItemSelector) -> Result<String>;

    /// Storage path of fully resolved coordinates
    fn coordinates_path(&self, coordinates: &ArtifactCoordinates) -> Result<String>;

    /// Resolve a selector into complete artifact coordinates, filling in
    /// layout defaults (artifact id from project id, extension from type)
    fn artifact_coordinates(&self, selector: &ItemSelector) -> Result<ArtifactCoordinates> {
        resolve_coordinates(selector)
    }

    fn artifact_path(&self, selector: &ItemSelector) -> Result<String> {
        let coordinates = self.artifact_coordinates(selector)?;
        self.coordinates_path(&coordinates)
    }

    /// Path for the most specific item the selector addresses
    fn to_path(&self, selector: &ItemSelector) -> Result<String> {
        match selector.granularity() {
            Granularity::None => Err(RepositoryError::InvalidArgument(
                "Selector has no coordinates".to_string(),
            )),
            Granularity::Namespace => self.namespace_path(selector),
            Granularity::Project => self.project_path(selector),
            Granularity::Version => self.version_path(selector),
            Granularity::Artifact => self.artifact_path(selector),
        }
    }

    /// Selector for an artifact file path
    fn to_item_selector(&self, path: &str) -> Result<ItemSelector>;

    /// Selector for a container path interpreted as the given item kind
    fn container_selector(&self, path: &str, kind: ItemKind) -> Result<ItemSelector>;
}

/// Look up a built-in layout by id
pub fn layout_for(id: &str) -> Option<Arc<dyn RepositoryLayout>> {
    match id {
        DEFAULT_LAYOUT => Some(Arc::new(Maven2Layout)),
        LEGACY_LAYOUT => Some(Arc::new(LegacyLayout)),
        _ => None,
    }
}

/// Reject values that cannot be a single path segment
pub(crate) fn check_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value == WILDCARD
        || value.contains('/')
        || value.contains('\\')
    {
        return Err(RepositoryError::InvalidArgument(format!(
            "'{}' is not a valid {}",
            value, field
        )));
    }
    Ok(())
}

pub(crate) fn missing(fields: &[&str], operation: &str) -> RepositoryError {
    RepositoryError::InvalidArgument(format!(
        "{} requires {} to be set on the selector",
        operation,
        fields.join(", ")
    ))
}

/// Classifier implied by a Maven type
pub fn classifier_for_type(artifact_type: &str) -> Option<&'static str> {
    match artifact_type {
        "java-source" => Some("sources"),
        "javadoc" => Some("javadoc"),
        "test-jar" => Some("tests"),
        _ => None,
    }
}

/// File extension implied by a Maven type
pub fn extension_for_type(artifact_type: &str) -> String {
    match artifact_type {
        "jar" | "java-source" | "javadoc" | "test-jar" | "maven-plugin" | "ejb" | "ejb-client" => {
            "jar".to_string()
        }
        other => other.to_string(),
    }
}

/// Maven type inferred from an extension and classifier
pub fn type_for(extension: &str, classifier: &str) -> String {
    match (extension, classifier) {
        ("jar", "sources") => "java-source".to_string(),
        ("jar", "javadoc") => "javadoc".to_string(),
        ("jar", "tests") => "test-jar".to_string(),
        (ext, _) => ext.to_string(),
    }
}

/// Shared coordinate resolution
pub(crate) fn resolve_coordinates(selector: &ItemSelector) -> Result<ArtifactCoordinates> {
    let mut absent = Vec::new();
    if !selector.has_namespace() {
        absent.push("namespace");
    }
    if !selector.has_project_id() && !selector.has_artifact_id() {
        absent.push("projectId");
    }
    if !selector.has_version() && !selector.has_artifact_version() {
        absent.push("version");
    }
    if !absent.is_empty() {
        return Err(missing(&absent, "artifact resolution"));
    }

    let namespace = selector.namespace().unwrap_or_default().to_string();
    let project_id = selector
        .project_id()
        .or(selector.artifact_id())
        .unwrap_or_default()
        .to_string();
    let artifact_id = selector.artifact_id().unwrap_or(project_id.as_str()).to_string();
    let artifact_version = selector
        .artifact_version()
        .or(selector.version())
        .unwrap_or_default()
        .to_string();
    let directory_version = selector
        .version()
        .map(version::base_version)
        .unwrap_or_else(|| version::base_version(&artifact_version));

    let artifact_type = selector.artifact_type().map(str::to_string);
    let extension = match (selector.extension(), artifact_type.as_deref()) {
        (Some(ext), _) => ext.to_string(),
        (None, Some(t)) => extension_for_type(t),
        (None, None) => "jar".to_string(),
    };
    let classifier = match (selector.classifier(), artifact_type.as_deref()) {
        (Some(c), _) => c.to_string(),
        (None, Some(t)) => classifier_for_type(t).unwrap_or_default().to_string(),
        (None, None) => String::new(),
    };
    let artifact_type = artifact_type.unwrap_or_else(|| type_for(&extension, &classifier));

    for (field, value) in [
        ("namespace", namespace.as_str()),
        ("projectId", project_id.as_str()),
        ("version", directory_version.as_str()),
        ("artifactId", artifact_id.as_str()),
        ("artifactVersion", artifact_version.as_str()),
        ("extension", extension.as_str()),
    ] {
        check_segment(field, value)?;
    }
    if !classifier.is_empty() {
        check_segment("classifier", &classifier)?;
    }

    Ok(ArtifactCoordinates {
        namespace,
        project_id,
        version: directory_version,
        artifact_id,
        artifact_version,
        classifier,
        extension,
        artifact_type,
    })
}

/// `artifactId-artifactVersion[-classifier].extension`
pub(crate) fn file_name(coordinates: &ArtifactCoordinates) -> String {
    let mut name = format!("{}-{}", coordinates.artifact_id, coordinates.artifact_version);
    if coordinates.has_classifier() {
        name.push('-');
        name.push_str(&coordinates.classifier);
    }
    name.push('.');
    name.push_str(&coordinates.extension);
    name
}

/// Split `-classifier.ext` or `.ext` following the version part of a file name
pub(crate) fn split_classifier_extension(rest: &str, path: &str) -> Result<(String, String)> {
    let invalid = || RepositoryError::Layout(format!("'{}' is not a valid artifact path", path));
    if let Some(ext) = rest.strip_prefix('.') {
        if ext.is_empty() {
            return Err(invalid());
        }
        return Ok((String::new(), ext.to_string()));
    }
    if let Some(tail) = rest.strip_prefix('-') {
        let (classifier, ext) = tail.split_once('.').ok_or_else(invalid)?;
        if classifier.is_empty() || ext.is_empty() {
            return Err(invalid());
        }
        return Ok((classifier.to_string(), ext.to_string()));
    }
    Err(invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_lookup() {
        assert_eq!(layout_for("default").unwrap().id(), DEFAULT_LAYOUT);
        assert_eq!(layout_for("legacy").unwrap().id(), LEGACY_LAYOUT);
        assert!(layout_for("p2").is_none());
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(classifier_for_type("java-source"), Some("sources"));
        assert_eq!(extension_for_type("test-jar"), "jar");
        assert_eq!(extension_for_type("pom"), "pom");
        assert_eq!(type_for("jar", "javadoc"), "javadoc");
        assert_eq!(type_for("tar.gz", ""), "tar.gz");
    }

    #[test]
    fn test_resolve_coordinates_defaults() {
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("1.0")
            .artifact_type("java-source")
            .build();
        let coordinates = resolve_coordinates(&selector).unwrap();
        assert_eq!(coordinates.artifact_id, "foo");
        assert_eq!(coordinates.artifact_version, "1.0");
        assert_eq!(coordinates.classifier, "sources");
        assert_eq!(coordinates.extension, "jar");
    }

    #[test]
    fn test_resolve_coordinates_missing_fields() {
        let selector = ItemSelector::builder().project_id("foo").build();
        let err = resolve_coordinates(&selector).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("namespace"));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_resolve_coordinates_rejects_traversal() {
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("..")
            .version("1.0")
            .build();
        assert!(resolve_coordinates(&selector).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_split_classifier_extension() {
        assert_eq!(
            split_classifier_extension(".tar.gz", "p").unwrap(),
            (String::new(), "tar.gz".to_string())
        );
        assert_eq!(
            split_classifier_extension("-sources.jar.sha256", "p").unwrap(),
            ("sources".to_string(), "jar.sha256".to_string())
        );
        assert!(split_classifier_extension("x.jar", "p").is_err());
        assert!(split_classifier_extension("-.jar", "p").is_err());
    }
}
