//! Maven 2 ("default") layout
//!
//! `com/example/foo/1.0/foo-1.0-sources.jar`: namespace segments become
//! directories, followed by the project and version containers. Timestamped
//! snapshot builds live in their generic `-SNAPSHOT` container.

use regex::Regex;
use std::sync::OnceLock;

use super::{
    check_segment, file_name, missing, split_classifier_extension, type_for, LayoutCapability,
    RepositoryLayout, DEFAULT_LAYOUT,
};
use crate::error::{RepositoryError, Result};
use crate::item::{ArtifactCoordinates, ItemKind};
use crate::metadata::METADATA_FILE;
use crate::selector::{Granularity, ItemSelector};
use crate::version;

fn timestamp_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{8}\.[0-9]{6}-[0-9]+").expect("static regex"))
}

/// Grouped-directory Maven 2 layout
#[derive(Debug, Clone, Copy, Default)]
pub struct Maven2Layout;

impl Maven2Layout {
    fn namespace_dirs(namespace: &str) -> Result<String> {
        let segments: Vec<&str> = namespace.split('.').collect();
        for segment in &segments {
            check_segment("namespace", segment)?;
        }
        Ok(segments.join("/"))
    }

    fn require_fields(selector: &ItemSelector, level: Granularity, operation: &str) -> Result<()> {
        let mut absent = Vec::new();
        if !selector.has_namespace() {
            absent.push("namespace");
        }
        if level >= Granularity::Project && !selector.has_project_id() {
            absent.push("projectId");
        }
        if level >= Granularity::Version && !selector.has_version() {
            absent.push("version");
        }
        if absent.is_empty() {
            Ok(())
        } else {
            Err(missing(&absent, operation))
        }
    }

    /// Split the part after `artifactId-` into the artifact version and the
    /// remaining `[-classifier].ext`
    fn split_version<'a>(directory_version: &str, rest: &'a str) -> Option<(String, &'a str)> {
        if version::is_generic_snapshot(directory_version) {
            let base = version::strip_snapshot(directory_version);
            if let Some(after_base) = rest.strip_prefix(base).and_then(|r| r.strip_prefix('-')) {
                if let Some(m) = timestamp_prefix().find(after_base) {
                    let artifact_version = format!("{}-{}", base, m.as_str());
                    return Some((artifact_version, &after_base[m.end()..]));
                }
            }
        }
        rest.strip_prefix(directory_version)
            .map(|remainder| (directory_version.to_string(), remainder))
    }
}

impl RepositoryLayout for Maven2Layout {
    fn id(&self) -> &'static str {
        DEFAULT_LAYOUT
    }

    fn supports(&self, _capability: LayoutCapability) -> bool {
        true
    }

    fn namespace_path(&self, selector: &ItemSelector) -> Result<String> {
        Self::require_fields(selector, Granularity::Namespace, "namespace path")?;
        Self::namespace_dirs(selector.namespace().unwrap_or_default())
    }

    fn project_path(&self, selector: &ItemSelector) -> Result<String> {
        Self::require_fields(selector, Granularity::Project, "project path")?;
        let project_id = selector.project_id().unwrap_or_default();
        check_segment("projectId", project_id)?;
        Ok(format!("{}/{}", self.namespace_path(selector)?, project_id))
    }

    fn version_path(&self, selector: &ItemSelector) -> Result<String> {
        Self::require_fields(selector, Granularity::Version, "version path")?;
        let directory = version::base_version(selector.version().unwrap_or_default());
        check_segment("version", &directory)?;
        Ok(format!("{}/{}", self.project_path(selector)?, directory))
    }

    fn metadata_path(&self, selector: &ItemSelector) -> Result<String> {
        let container = match selector.granularity() {
            Granularity::None => {
                return Err(RepositoryError::InvalidArgument(
                    "Metadata lookup requires at least a namespace".to_string(),
                ))
            }
            Granularity::Namespace => self.namespace_path(selector)?,
            Granularity::Project => self.project_path(selector)?,
            Granularity::Version => self.version_path(selector)?,
            Granularity::Artifact => {
                let coordinates = self.artifact_coordinates(selector)?;
                let version_selector = ItemSelector::builder()
                    .namespace(&coordinates.namespace)
                    .project_id(&coordinates.project_id)
                    .version(&coordinates.version)
                    .build();
                self.version_path(&version_selector)?
            }
        };
        Ok(format!("{}/{}", container, METADATA_FILE))
    }

    fn coordinates_path(&self, coordinates: &ArtifactCoordinates) -> Result<String> {
        Ok(format!(
            "{}/{}/{}/{}",
            Self::namespace_dirs(&coordinates.namespace)?,
            coordinates.project_id,
            coordinates.version,
            file_name(coordinates)
        ))
    }

    fn artifact_coordinates(&self, selector: &ItemSelector) -> Result<ArtifactCoordinates> {
        let coordinates = super::resolve_coordinates(selector)?;
        // The project container carries the artifact id in this layout
        if coordinates.artifact_id != coordinates.project_id {
            return Err(RepositoryError::InvalidArgument(format!(
                "Artifact id '{}' does not match project '{}'",
                coordinates.artifact_id, coordinates.project_id
            )));
        }
        // Files live in the container of their base version
        if version::base_version(&coordinates.artifact_version) != coordinates.version {
            return Err(RepositoryError::InvalidArgument(format!(
                "Artifact version '{}' does not belong to version '{}'",
                coordinates.artifact_version, coordinates.version
            )));
        }
        Ok(coordinates)
    }

    fn to_item_selector(&self, path: &str) -> Result<ItemSelector> {
        let invalid = || RepositoryError::Layout(format!("'{}' is not a valid artifact path", path));
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        let file = segments[segments.len() - 1];
        if file == METADATA_FILE {
            return Err(invalid());
        }
        let directory_version = segments[segments.len() - 2];
        let project_id = segments[segments.len() - 3];
        let namespace = segments[..segments.len() - 3].join(".");

        let rest = file
            .strip_prefix(project_id)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let (artifact_version, remainder) =
            Self::split_version(directory_version, rest).ok_or_else(invalid)?;
        let (classifier, extension) = split_classifier_extension(remainder, path)?;
        let artifact_type = type_for(&extension, &classifier);

        Ok(ItemSelector::builder()
            .namespace(namespace)
            .project_id(project_id)
            .version(directory_version)
            .artifact_id(project_id)
            .artifact_version(artifact_version)
            .classifier(classifier)
            .extension(extension)
            .artifact_type(artifact_type)
            .build())
    }

    fn container_selector(&self, path: &str, kind: ItemKind) -> Result<ItemSelector> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let invalid = || {
            RepositoryError::Layout(format!("'{}' cannot be interpreted as a {}", path, kind))
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        let n = segments.len();
        match kind {
            ItemKind::Namespace => Ok(ItemSelector::builder()
                .namespace(segments.join("."))
                .build()),
            ItemKind::Project if n >= 2 => Ok(ItemSelector::builder()
                .namespace(segments[..n - 1].join("."))
                .project_id(segments[n - 1])
                .build()),
            ItemKind::Version if n >= 3 => Ok(ItemSelector::builder()
                .namespace(segments[..n - 2].join("."))
                .project_id(segments[n - 2])
                .version(segments[n - 1])
                .build()),
            _ => Err(invalid()),
        }
    }
}
