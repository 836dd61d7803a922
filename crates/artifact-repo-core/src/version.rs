//! Maven version handling
//!
//! Snapshot detection, timestamped snapshot builds (`1.0-20240101.120000-3`)
//! and the ordering used for `latest`/`release` computation and retention.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Suffix of generic snapshot versions
pub const SNAPSHOT_SUFFIX: &str = "SNAPSHOT";

/// Timestamp format used in unique snapshot versions
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d.%H%M%S";

fn unique_snapshot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)-([0-9]{8}\.[0-9]{6})-([0-9]+)$").expect("static regex")
    })
}

/// Whether the version is a snapshot (generic or timestamped)
pub fn is_snapshot(version: &str) -> bool {
    is_generic_snapshot(version) || is_unique_snapshot(version)
}

/// `X-SNAPSHOT` form
pub fn is_generic_snapshot(version: &str) -> bool {
    version.ends_with(SNAPSHOT_SUFFIX)
}

/// `X-yyyyMMdd.HHmmss-N` form
pub fn is_unique_snapshot(version: &str) -> bool {
    unique_snapshot_pattern().is_match(version)
}

/// Directory version for a version string: timestamped builds map to their
/// generic `-SNAPSHOT` version, everything else is returned unchanged.
pub fn base_version(version: &str) -> String {
    match SnapshotBuild::parse(version) {
        Some(build) => format!("{}-{}", build.base, SNAPSHOT_SUFFIX),
        None => version.to_string(),
    }
}

/// Version without the `-SNAPSHOT` suffix
pub fn strip_snapshot(version: &str) -> &str {
    version
        .strip_suffix(SNAPSHOT_SUFFIX)
        .map(|v| v.strip_suffix('-').unwrap_or(v))
        .unwrap_or(version)
}

/// A concrete timestamped snapshot build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotBuild {
    /// Version without the `-SNAPSHOT` suffix, e.g. `1.0`
    pub base: String,
    /// Deployment timestamp (`yyyyMMdd.HHmmss`)
    pub timestamp: String,
    /// Build number, starting at 1
    pub build_number: u32,
}

impl SnapshotBuild {
    /// Parse a `base-yyyyMMdd.HHmmss-N` version
    pub fn parse(version: &str) -> Option<Self> {
        let captures = unique_snapshot_pattern().captures(version)?;
        let build_number = captures[3].parse().ok()?;
        Some(Self {
            base: captures[1].to_string(),
            timestamp: captures[2].to_string(),
            build_number,
        })
    }

    /// Build for a generic snapshot version at the given instant
    pub fn new(snapshot_version: &str, at: DateTime<Utc>, build_number: u32) -> Self {
        Self {
            base: strip_snapshot(snapshot_version).to_string(),
            timestamp: format_timestamp(at),
            build_number,
        }
    }

    /// The unique version string
    pub fn version(&self) -> String {
        format!("{}-{}-{}", self.base, self.timestamp, self.build_number)
    }

    /// Parsed timestamp, if well-formed
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

impl fmt::Display for SnapshotBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version())
    }
}

/// Format an instant as a snapshot timestamp
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a snapshot timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" | "a" => 0,
        "beta" | "b" => 1,
        "milestone" | "m" => 2,
        "rc" | "cr" => 3,
        "snapshot" => 4,
        "" | "ga" | "final" | "release" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn tokenize(version: &str) -> Vec<Item> {
    let mut items = Vec::new();
    for part in version.to_lowercase().split(['.', '-']) {
        let mut current = String::new();
        let mut digits = false;
        for c in part.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != digits {
                items.push(to_item(&current, digits));
                current.clear();
            }
            digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            items.push(to_item(&current, digits));
        }
    }
    items
}

fn to_item(token: &str, digits: bool) -> Item {
    if digits {
        // Absurdly long numeric segments saturate rather than fail
        Item::Number(token.parse().unwrap_or(u64::MAX))
    } else {
        Item::Qualifier(token.to_string())
    }
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (Some(Item::Number(x)), Some(Item::Number(y))) => x.cmp(y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => qualifier_rank(x)
            .cmp(&qualifier_rank(y))
            .then_with(|| x.cmp(y)),
        (Some(Item::Number(x)), None) => x.cmp(&0),
        (None, Some(Item::Number(y))) => 0.cmp(y),
        (Some(Item::Qualifier(x)), None) => qualifier_rank(x).cmp(&qualifier_rank("")),
        (None, Some(Item::Qualifier(y))) => qualifier_rank("").cmp(&qualifier_rank(y)),
        (None, None) => Ordering::Equal,
    }
}

/// Compare two version strings using Maven ordering
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ordering = compare_items(left.get(i), right.get(i));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort versions ascending in place
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(a, b));
}

/// Version string ordered with Maven semantics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MavenVersion(String);

impl MavenVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot(&self.0)
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_detection() {
        assert!(is_snapshot("1.0-SNAPSHOT"));
        assert!(is_snapshot("1.0-20240101.120000-3"));
        assert!(!is_snapshot("1.0"));
        assert!(is_generic_snapshot("1.0-SNAPSHOT"));
        assert!(!is_generic_snapshot("1.0-20240101.120000-3"));
        assert!(is_unique_snapshot("1.0-20240101.120000-3"));
    }

    #[test]
    fn test_base_version() {
        assert_eq!(base_version("1.0-20240101.120000-3"), "1.0-SNAPSHOT");
        assert_eq!(base_version("1.0-SNAPSHOT"), "1.0-SNAPSHOT");
        assert_eq!(base_version("2.1"), "2.1");
        assert_eq!(strip_snapshot("1.0-SNAPSHOT"), "1.0");
        assert_eq!(strip_snapshot("1.0"), "1.0");
    }

    #[test]
    fn test_snapshot_build() {
        let build = SnapshotBuild::parse("1.0-rc-20240101.120000-12").unwrap();
        assert_eq!(build.base, "1.0-rc");
        assert_eq!(build.timestamp, "20240101.120000");
        assert_eq!(build.build_number, 12);
        assert_eq!(build.version(), "1.0-rc-20240101.120000-12");
        assert!(build.instant().is_some());

        let at = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        let fresh = SnapshotBuild::new("2.0-SNAPSHOT", at, 1);
        assert_eq!(fresh.version(), "2.0-20240309.080706-1");
    }

    #[test]
    fn test_version_ordering() {
        let less = |a: &str, b: &str| compare_versions(a, b) == Ordering::Less;
        assert!(less("1.0", "1.1"));
        assert!(less("1.9", "1.10"));
        assert!(less("1.0-alpha", "1.0-beta"));
        assert!(less("1.0-beta", "1.0-rc1"));
        assert!(less("1.0-rc1", "1.0-rc2"));
        assert!(less("1.0-SNAPSHOT", "1.0"));
        assert!(less("1.0", "1.0-sp1"));
        assert!(less("1.0", "1.0.1"));
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_sort_versions() {
        let mut versions: Vec<String> = ["1.10", "1.2", "1.0-SNAPSHOT", "1.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_versions(&mut versions);
        assert_eq!(versions, vec!["1.0-SNAPSHOT", "1.0", "1.2", "1.10"]);
        let max = versions.iter().cloned().map(MavenVersion::new).max().unwrap();
        assert_eq!(max.as_str(), "1.10");
    }
}
