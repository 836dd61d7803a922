//! Legacy flat layout
//!
//! `com.example/jars/foo-1.0.jar`: the namespace is a single directory and
//! artifacts are grouped by type, with no project or version containers.
//! Operations that depend on those containers fail with a layout error.

use super::{
    check_segment, classifier_for_type, file_name, missing, type_for, LayoutCapability,
    RepositoryLayout, LEGACY_LAYOUT,
};
use crate::error::{RepositoryError, Result};
use crate::item::{ArtifactCoordinates, ItemKind};
use crate::metadata::METADATA_FILE;
use crate::selector::{Granularity, ItemSelector};
use crate::version;

/// Maven 1 style layout
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyLayout;

/// Split a file name into stem and extension, keeping compound extensions
/// such as `tar.gz` and `jar.sha256` together
fn split_extension(name: &str) -> Option<(&str, String)> {
    let (stem, last) = name.rsplit_once('.')?;
    let companion = crate::checksum::is_checksum_extension(last) || last == "asc";
    if companion || last == "gz" || last == "bz2" {
        if let Some((inner_stem, inner)) = stem.rsplit_once('.') {
            let keep = if companion {
                !inner.chars().all(|c| c.is_ascii_digit())
            } else {
                inner == "tar"
            };
            if keep {
                return Some((inner_stem, format!("{}.{}", inner, last)));
            }
        }
    }
    Some((stem, last.to_string()))
}

fn type_directory(artifact_type: &str) -> String {
    format!("{}s", artifact_type)
}

impl RepositoryLayout for LegacyLayout {
    fn id(&self) -> &'static str {
        LEGACY_LAYOUT
    }

    fn supports(&self, capability: LayoutCapability) -> bool {
        !matches!(
            capability,
            LayoutCapability::VersionContainers
                | LayoutCapability::ProjectMetadata
                | LayoutCapability::RelatedArtifacts
                | LayoutCapability::SnapshotTimestamps
        )
    }

    fn namespace_path(&self, selector: &ItemSelector) -> Result<String> {
        let namespace = selector
            .namespace()
            .ok_or_else(|| missing(&["namespace"], "namespace path"))?;
        check_segment("namespace", namespace)?;
        Ok(namespace.to_string())
    }

    fn project_path(&self, _selector: &ItemSelector) -> Result<String> {
        Err(RepositoryError::Layout(
            "The 'legacy' layout has no project containers".to_string(),
        ))
    }

    fn version_path(&self, _selector: &ItemSelector) -> Result<String> {
        self.require(LayoutCapability::VersionContainers)?;
        not_representable()
    }

    fn metadata_path(&self, selector: &ItemSelector) -> Result<String> {
        match selector.granularity() {
            Granularity::Namespace => Ok(format!(
                "{}/{}",
                self.namespace_path(selector)?,
                METADATA_FILE
            )),
            Granularity::None => Err(RepositoryError::InvalidArgument(
                "Metadata lookup requires at least a namespace".to_string(),
            )),
            _ => {
                self.require(LayoutCapability::ProjectMetadata)?;
                not_representable()
            }
        }
    }

    fn coordinates_path(&self, coordinates: &ArtifactCoordinates) -> Result<String> {
        check_segment("namespace", &coordinates.namespace)?;
        check_segment("type", &coordinates.artifact_type)?;
        Ok(format!(
            "{}/{}/{}",
            coordinates.namespace,
            type_directory(&coordinates.artifact_type),
            file_name(coordinates)
        ))
    }

    fn artifact_coordinates(&self, selector: &ItemSelector) -> Result<ArtifactCoordinates> {
        let mut coordinates = super::resolve_coordinates(selector)?;
        // No version containers: a timestamped build is its own version
        coordinates.version = coordinates.artifact_version.clone();
        Ok(coordinates)
    }

    fn to_item_selector(&self, path: &str) -> Result<ItemSelector> {
        let invalid = || RepositoryError::Layout(format!("'{}' is not a valid legacy path", path));
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        let namespace = segments[0];
        let artifact_type = segments[1].strip_suffix('s').filter(|t| !t.is_empty()).ok_or_else(invalid)?;
        let (stem, extension) = split_extension(segments[2]).ok_or_else(invalid)?;

        // The version starts at the first '-' followed by a digit
        let version_start = stem
            .char_indices()
            .zip(stem.chars().skip(1))
            .find(|((_, c), next)| *c == '-' && next.is_ascii_digit())
            .map(|((idx, _), _)| idx)
            .ok_or_else(invalid)?;
        let artifact_id = &stem[..version_start];
        let mut artifact_version = &stem[version_start + 1..];
        let mut classifier = "";
        if let Some(implied) = classifier_for_type(artifact_type) {
            if let Some(v) = artifact_version.strip_suffix(&format!("-{}", implied)) {
                artifact_version = v;
                classifier = implied;
            }
        }
        if artifact_id.is_empty() || artifact_version.is_empty() {
            return Err(invalid());
        }

        let inferred = type_for(&extension, classifier);
        let artifact_type = if inferred == artifact_type {
            inferred
        } else {
            artifact_type.to_string()
        };

        Ok(ItemSelector::builder()
            .namespace(namespace)
            .project_id(artifact_id)
            .version(version::base_version(artifact_version))
            .artifact_id(artifact_id)
            .artifact_version(artifact_version)
            .classifier(classifier)
            .extension(extension)
            .artifact_type(artifact_type)
            .build())
    }

    fn container_selector(&self, path: &str, kind: ItemKind) -> Result<ItemSelector> {
        let path = path.trim_matches('/');
        match kind {
            ItemKind::Namespace if !path.is_empty() && !path.contains('/') => {
                Ok(ItemSelector::builder().namespace(path).build())
            }
            ItemKind::Namespace => Err(RepositoryError::Layout(format!(
                "'{}' is not a legacy namespace",
                path
            ))),
            _ => Err(RepositoryError::Layout(format!(
                "The 'legacy' layout has no {} containers",
                kind
            ))),
        }
    }
}

fn not_representable() -> Result<String> {
    Err(RepositoryError::Layout(
        "Operation is not representable in the 'legacy' layout".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_artifact_path() {
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("1.0")
            .extension("jar")
            .build();
        assert_eq!(
            LegacyLayout.to_path(&selector).unwrap(),
            "com.example/jars/foo-1.0.jar"
        );
        let sources = selector.to_builder().artifact_type("java-source").build();
        assert_eq!(
            LegacyLayout.to_path(&sources).unwrap(),
            "com.example/java-sources/foo-1.0-sources.jar"
        );
    }

    #[test]
    fn test_to_item_selector() {
        let selector = LegacyLayout
            .to_item_selector("com.example/java-sources/foo-bar-1.0-sources.jar")
            .unwrap();
        assert_eq!(selector.namespace(), Some("com.example"));
        assert_eq!(selector.artifact_id(), Some("foo-bar"));
        assert_eq!(selector.artifact_version(), Some("1.0"));
        assert_eq!(selector.classifier(), Some("sources"));
        assert_eq!(selector.artifact_type(), Some("java-source"));

        let checksum = LegacyLayout
            .to_item_selector("com.example/jars/foo-1.0.jar.sha256")
            .unwrap();
        assert_eq!(checksum.extension(), Some("jar.sha256"));
        assert_eq!(checksum.artifact_type(), Some("jar"));
    }

    #[test]
    fn test_unsupported_operations() {
        let selector = ItemSelector::builder()
            .namespace("com.example")
            .project_id("foo")
            .version("1.0")
            .build();
        assert!(matches!(
            LegacyLayout.version_path(&selector),
            Err(RepositoryError::Layout(_))
        ));
        assert!(matches!(
            LegacyLayout.project_path(&selector),
            Err(RepositoryError::Layout(_))
        ));
        assert!(matches!(
            LegacyLayout.metadata_path(&selector),
            Err(RepositoryError::Layout(_))
        ));
        assert!(!LegacyLayout.supports(LayoutCapability::RelatedArtifacts));
        assert!(LegacyLayout.require(LayoutCapability::RelatedArtifacts).is_err());
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a-1.0.jar"), Some(("a-1.0", "jar".to_string())));
        assert_eq!(split_extension("a-1.0.tar.gz"), Some(("a-1.0", "tar.gz".to_string())));
        assert_eq!(split_extension("a-1.0.jar.md5"), Some(("a-1.0", "jar.md5".to_string())));
        assert_eq!(split_extension("noext"), None);
    }

    proptest! {
        #[test]
        fn prop_path_round_trip(
            namespace in "[a-z]{1,6}(\\.[a-z]{1,6}){0,2}",
            artifact in "[a-z]{1,6}(-[a-z]{1,4})?",
            major in 0u32..20,
            minor in 0u32..20,
            artifact_type in prop::sample::select(vec!["jar", "pom", "java-source", "javadoc"]),
        ) {
            let selector = ItemSelector::builder()
                .namespace(namespace)
                .project_id(&artifact)
                .version(format!("{}.{}", major, minor))
                .artifact_type(artifact_type)
                .build();
            let layout = LegacyLayout;
            let path = layout.to_path(&selector).unwrap();
            let parsed = layout.to_item_selector(&path).unwrap();
            prop_assert_eq!(layout.to_path(&parsed).unwrap(), path.clone());
            let again = layout.to_item_selector(&layout.to_path(&parsed).unwrap()).unwrap();
            prop_assert_eq!(again, parsed);
        }
    }
}
