//! # Coordinate Codec
//!
//! Parses and serializes package coordinates and maps them onto repository
//! paths. Everything in this module is a pure function: no I/O, no clock.
//!
//! ## Coordinate syntax (`maven2`)
//!
//! | Form                                          | Example                              |
//! |-----------------------------------------------|--------------------------------------|
//! | `group:artifact:version`                      | `org.example:lib:1.0.0`              |
//! | `group:artifact:extension:version`            | `org.example:lib:war:1.0.0`          |
//! | `group:artifact:extension:classifier:version` | `org.example:lib:jar:sources:1.0.0`  |
//!
//! The extension defaults to `jar`.
//!
//! ## Path layout (`maven2`)
//!
//! ```text
//! org/example/lib/1.0.0/lib-1.0.0.jar
//! org/example/lib/1.0.0/lib-1.0.0-sources.jar
//! org/example/lib/1.0-SNAPSHOT/lib-1.0-20240101.120000-1.jar
//! ```
//!
//! Timestamped snapshot builds live in their floating `-SNAPSHOT` directory.
//! [`from_path`] inverts [`to_path`] for every valid coordinate.

use crate::error::{AppError, AppResult};
use crate::path::RelativePath;
use crate::validation::{self, MAX_COORDINATE_LENGTH};
use crate::version::{self, SNAPSHOT_SUFFIX};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Extension assumed when a coordinate does not name one.
pub const DEFAULT_EXTENSION: &str = "jar";

/// Extension of the project descriptor.
pub const DESCRIPTOR_EXTENSION: &str = "pom";

/// Sidecar suffixes that describe another file instead of being an artifact.
const SIDECAR_SUFFIXES: &[&str] = &[".sha1", ".sha256", ".sha512", ".md5", ".asc"];

static TIMESTAMP_REMAINDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8}\.\d{6}-\d+)(.*)$")
        .expect("Snapshot file regex should compile - this is a static pattern")
});

/// Rule set mapping coordinates onto paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryLayout {
    #[default]
    Maven2,
}

impl RepositoryLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryLayout::Maven2 => "maven2",
        }
    }
}

impl fmt::Display for RepositoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryLayout {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maven2" | "maven" => Ok(RepositoryLayout::Maven2),
            other => Err(AppError::BadRequest(format!("Unknown layout '{other}'"))),
        }
    }
}

/// Structured identifier of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub group: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    /// Build a coordinate from individual fields, validating each.
    pub fn new(
        group: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        classifier: Option<String>,
        extension: impl Into<String>,
    ) -> AppResult<Self> {
        let coordinate = Coordinate {
            group: group.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: classifier.filter(|c| !c.is_empty()),
            extension: extension.into(),
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Check every field against the codec's rules.
    pub fn validate(&self) -> AppResult<()> {
        let malformed = |reason: String| AppError::MalformedCoordinate {
            input: self.to_string(),
            reason,
        };

        check_field("group", &self.group).map_err(malformed)?;
        for part in self.group.split('.') {
            if part.is_empty() {
                return Err(malformed(
                    "group contains an empty dot-separated segment".to_string(),
                ));
            }
            validation::validate_segment(part)
                .map_err(|e| malformed(format!("group segment '{part}': {e}")))?;
        }

        check_field("artifactId", &self.artifact_id).map_err(malformed)?;
        check_field("version", &self.version).map_err(malformed)?;

        if let Some(classifier) = &self.classifier {
            check_field("classifier", classifier).map_err(malformed)?;
            if classifier.contains('.') {
                return Err(malformed("classifier cannot contain '.'".to_string()));
            }
        }

        check_field("extension", &self.extension).map_err(malformed)?;
        if self.extension.starts_with('.')
            || self.extension.ends_with('.')
            || self.extension.contains("..")
        {
            return Err(malformed(format!(
                "extension '{}' is malformed",
                self.extension
            )));
        }

        validation::validate_segment(&self.file_name())
            .map_err(|e| malformed(format!("file name: {e}")))?;

        Ok(())
    }

    /// Parse the colon-separated form.
    pub fn parse(raw: &str) -> AppResult<Self> {
        parse(raw)
    }

    /// Canonical path of this coordinate under `layout`.
    pub fn to_path(&self, layout: RepositoryLayout) -> RelativePath {
        to_path(self, layout)
    }

    /// File name inside the version directory.
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// Directory version (`1.0-SNAPSHOT` for timestamped builds).
    pub fn base_version(&self) -> String {
        version::base_version(&self.version)
    }

    pub fn is_snapshot(&self) -> bool {
        version::is_snapshot(&self.version)
    }

    /// Checksum or signature files that accompany another artifact.
    pub fn is_sidecar(&self) -> bool {
        SIDECAR_SUFFIXES
            .iter()
            .any(|suffix| self.extension.ends_with(suffix))
    }

    /// The project descriptor itself.
    pub fn is_descriptor(&self) -> bool {
        self.classifier.is_none() && self.extension == DESCRIPTOR_EXTENSION
    }

    /// Whether committing this artifact involves its version's descriptor.
    pub fn has_descriptor(&self) -> bool {
        self.classifier.is_none() && !self.is_descriptor() && !self.is_sidecar()
    }

    /// Coordinate of the descriptor accompanying this artifact version.
    pub fn descriptor(&self) -> Coordinate {
        Coordinate {
            group: self.group.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            classifier: None,
            extension: DESCRIPTOR_EXTENSION.to_string(),
        }
    }

    /// Same coordinate with a different version.
    pub fn with_version(&self, version: impl Into<String>) -> Coordinate {
        Coordinate {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Directory holding every version of this artifact (`org/example/lib`).
    pub fn artifact_dir(&self, layout: RepositoryLayout) -> RelativePath {
        let path = to_path(self, layout);
        path.prefix(path.len().saturating_sub(2))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.classifier, self.extension.as_str()) {
            (None, DEFAULT_EXTENSION) => {
                write!(f, "{}:{}:{}", self.group, self.artifact_id, self.version)
            }
            (None, extension) => write!(
                f,
                "{}:{}:{}:{}",
                self.group, self.artifact_id, extension, self.version
            ),
            (Some(classifier), extension) => write!(
                f,
                "{}:{}:{}:{}:{}",
                self.group, self.artifact_id, extension, classifier, self.version
            ),
        }
    }
}

impl FromStr for Coordinate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

fn check_field(name: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{name} is empty"));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(format!("{name} '{value}' contains a path separator"));
    }
    if value.contains(':') {
        return Err(format!("{name} '{value}' contains ':'"));
    }
    validation::validate_segment(value).map_err(|e| format!("{name} '{value}': {e}"))
}

/// Parse `group:artifact[:extension[:classifier]]:version`.
pub fn parse(raw: &str) -> AppResult<Coordinate> {
    let raw = raw.trim();
    let malformed = |reason: &str| AppError::MalformedCoordinate {
        input: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.len() > MAX_COORDINATE_LENGTH {
        return Err(malformed("coordinate is too long"));
    }

    let parts: Vec<&str> = raw.split(':').collect();
    let (group, artifact_id, extension, classifier, version) = match parts.as_slice() {
        [g, a, v] => (*g, *a, DEFAULT_EXTENSION, None, *v),
        [g, a, e, v] => (*g, *a, *e, None, *v),
        [g, a, e, c, v] => {
            if c.is_empty() {
                return Err(malformed("classifier is empty"));
            }
            (*g, *a, *e, Some(c.to_string()), *v)
        }
        _ => {
            return Err(malformed(
                "expected group:artifact[:extension[:classifier]]:version",
            ))
        }
    };

    let coordinate = Coordinate {
        group: group.to_string(),
        artifact_id: artifact_id.to_string(),
        version: version.to_string(),
        classifier,
        extension: extension.to_string(),
    };
    coordinate.validate().map_err(|e| match e {
        AppError::MalformedCoordinate { reason, .. } => malformed(&reason),
        other => other,
    })?;
    Ok(coordinate)
}

/// Canonical relative path of `coordinate` under `layout`.
pub fn to_path(coordinate: &Coordinate, layout: RepositoryLayout) -> RelativePath {
    match layout {
        RepositoryLayout::Maven2 => {
            let mut segments: Vec<String> =
                coordinate.group.split('.').map(str::to_string).collect();
            segments.push(coordinate.artifact_id.clone());
            segments.push(coordinate.base_version());
            segments.push(coordinate.file_name());
            // Fields were validated when the coordinate was built.
            RelativePath::from_segments(segments).unwrap_or_default()
        }
    }
}

/// `(group, artifactId)` of an artifact directory such as `org/example/lib`,
/// the parent of every version directory of that artifact.
pub fn artifact_from_dir(path: &RelativePath, layout: RepositoryLayout) -> AppResult<(String, String)> {
    let not_an_artifact = || AppError::NotACoordinate {
        path: path.to_string(),
    };

    match layout {
        RepositoryLayout::Maven2 => {
            let segments = path.segments();
            let (artifact_id, group_segments) =
                segments.split_last().ok_or_else(not_an_artifact)?;
            if group_segments.is_empty() || group_segments.iter().any(|s| s.contains('.')) {
                return Err(not_an_artifact());
            }
            Ok((group_segments.join("."), artifact_id.clone()))
        }
    }
}

/// Inverse of [`to_path`]. Fails with `NotACoordinate` for any path that
/// [`to_path`] would not produce.
pub fn from_path(path: &RelativePath, layout: RepositoryLayout) -> AppResult<Coordinate> {
    let not_a_coordinate = || AppError::NotACoordinate {
        path: path.to_string(),
    };

    match layout {
        RepositoryLayout::Maven2 => {
            let segments = path.segments();
            if segments.len() < 4 {
                return Err(not_a_coordinate());
            }
            let n = segments.len();
            let file = &segments[n - 1];
            let version_dir = &segments[n - 2];
            let artifact_id = &segments[n - 3];
            let group_segments = &segments[..n - 3];

            if group_segments.iter().any(|s| s.contains('.')) {
                return Err(not_a_coordinate());
            }

            let exact_prefix = format!("{artifact_id}-{version_dir}");
            let (version, rest) = if let Some(rest) = file.strip_prefix(&exact_prefix) {
                (version_dir.clone(), rest.to_string())
            } else if let Some(base) = version_dir.strip_suffix(SNAPSHOT_SUFFIX) {
                let build_prefix = format!("{artifact_id}-{base}-");
                let remainder = file
                    .strip_prefix(&build_prefix)
                    .ok_or_else(not_a_coordinate)?;
                let caps = TIMESTAMP_REMAINDER
                    .captures(remainder)
                    .ok_or_else(not_a_coordinate)?;
                (format!("{base}-{}", &caps[1]), caps[2].to_string())
            } else {
                return Err(not_a_coordinate());
            };

            let (classifier, extension) = if let Some(extension) = rest.strip_prefix('.') {
                (None, extension.to_string())
            } else if let Some(tail) = rest.strip_prefix('-') {
                let dot = tail.find('.').ok_or_else(not_a_coordinate)?;
                (Some(tail[..dot].to_string()), tail[dot + 1..].to_string())
            } else {
                return Err(not_a_coordinate());
            };

            let coordinate = Coordinate {
                group: group_segments.join("."),
                artifact_id: artifact_id.clone(),
                version,
                classifier,
                extension,
            };
            coordinate.validate().map_err(|_| not_a_coordinate())?;

            if to_path(&coordinate, layout) != *path {
                return Err(not_a_coordinate());
            }
            Ok(coordinate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(raw: &str) -> Coordinate {
        Coordinate::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        let c = coord("org.example:lib:1.0.0");
        assert_eq!(c.group, "org.example");
        assert_eq!(c.artifact_id, "lib");
        assert_eq!(c.version, "1.0.0");
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "jar");

        let c = coord("org.example:lib:war:1.0.0");
        assert_eq!(c.extension, "war");

        let c = coord("org.example:lib:jar:sources:1.0.0");
        assert_eq!(c.classifier.as_deref(), Some("sources"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "",
            "org.example:lib",
            ":lib:1.0",
            "org.example::1.0",
            "org.example:lib:",
            "org/example:lib:1.0",
            "org.example:l\\ib:1.0",
            "org..example:lib:1.0",
            "org.example:lib:jar::1.0",
            "org.example:lib:jar:so.urces:1.0",
            "org.example:lib:.jar:1.0",
            "a:b:c:d:e:f",
        ] {
            assert!(
                matches!(
                    Coordinate::parse(raw),
                    Err(AppError::MalformedCoordinate { .. })
                ),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for raw in [
            "org.example:lib:1.0.0",
            "org.example:lib:war:1.0.0",
            "org.example:lib:jar:sources:1.0.0",
            "org.example:lib:pom:1.0-SNAPSHOT",
        ] {
            assert_eq!(coord(raw).to_string(), raw);
            assert_eq!(coord(&coord(raw).to_string()), coord(raw));
        }
    }

    #[test]
    fn test_to_path_example() {
        let c = coord("org.example:lib:1.0.0");
        assert_eq!(
            c.to_path(RepositoryLayout::Maven2).to_string(),
            "org/example/lib/1.0.0/lib-1.0.0.jar"
        );
        assert_eq!(
            c.artifact_dir(RepositoryLayout::Maven2).to_string(),
            "org/example/lib"
        );
    }

    #[test]
    fn test_timestamped_snapshot_path() {
        let c = coord("com.acme:app:jar:tests:2.0-20240301.101500-4");
        assert_eq!(
            c.to_path(RepositoryLayout::Maven2).to_string(),
            "com/acme/app/2.0-SNAPSHOT/app-2.0-20240301.101500-4-tests.jar"
        );
    }

    #[test]
    fn test_round_trip_law() {
        let layout = RepositoryLayout::Maven2;
        for raw in [
            "org.example:lib:1.0.0",
            "org:lib:1",
            "org.example:lib-core:jar:sources:1.0.0",
            "org.example:lib:tar.gz:1.0.0",
            "org.example:lib:jar.sha1:1.0.0",
            "org.example:lib:pom:1.0-SNAPSHOT",
            "org.example:lib:1.0-snapshot",
            "org.example:lib:1.0-20240101.120000-1",
            "org.example:lib:jar:javadoc:1.0-20240101.120000-12",
            "io.x.y.z:a-b-c:zip:linux-x86_64:3.2.1-beta-2",
            "org.example:lib:1.0-SNAPSHOT-20240101.120000-1",
        ] {
            let c = coord(raw);
            let path = to_path(&c, layout);
            assert_eq!(from_path(&path, layout).unwrap(), c, "{raw} via {path}");
        }
    }

    #[test]
    fn test_distinct_coordinates_do_not_collide() {
        let layout = RepositoryLayout::Maven2;
        let a = coord("org.example:lib:jar:x:1.0");
        let b = coord("org.example:lib:x.jar:1.0");
        let c = coord("org.example.lib:x:1.0");
        assert_ne!(to_path(&a, layout), to_path(&b, layout));
        assert_ne!(to_path(&a, layout), to_path(&c, layout));
    }

    #[test]
    fn test_from_path_rejects_non_coordinates() {
        let layout = RepositoryLayout::Maven2;
        for raw in [
            "org/example/lib/maven-metadata.xml",
            "org/example/lib",
            "lib/1.0/lib-1.0.jar",
            "org/example/lib/1.0/other-1.0.jar",
            "org/example/lib/1.0/lib-1.0",
            "org/example/lib/1.0/lib-1.0-sources",
            "org.example/lib/1.0/lib-1.0.jar",
            "org/example/lib/1.0/lib-2.0.jar",
        ] {
            let path = RelativePath::parse(raw).unwrap();
            assert!(
                matches!(
                    from_path(&path, layout),
                    Err(AppError::NotACoordinate { .. })
                ),
                "{raw} should not be a coordinate"
            );
        }
    }

    #[test]
    fn test_artifact_from_dir() {
        let layout = RepositoryLayout::Maven2;
        let dir = coord("org.example:lib:1.0").artifact_dir(layout);
        assert_eq!(
            artifact_from_dir(&dir, layout).unwrap(),
            ("org.example".to_string(), "lib".to_string())
        );
        for raw in ["lib", "org.example/lib"] {
            assert!(artifact_from_dir(&RelativePath::parse(raw).unwrap(), layout).is_err(), "{raw}");
        }
        assert!(artifact_from_dir(&RelativePath::root(), layout).is_err());
    }

    #[test]
    fn test_descriptor_relationships() {
        let jar = coord("org.example:lib:1.0.0");
        assert!(jar.has_descriptor());
        assert_eq!(jar.descriptor().to_string(), "org.example:lib:pom:1.0.0");
        assert!(jar.descriptor().is_descriptor());
        assert!(!coord("org.example:lib:jar:sources:1.0.0").has_descriptor());
        assert!(coord("org.example:lib:jar.sha1:1.0.0").is_sidecar());
        assert!(!coord("org.example:lib:jar.sha1:1.0.0").has_descriptor());
    }

    #[test]
    fn test_layout_from_str() {
        assert_eq!(
            "maven2".parse::<RepositoryLayout>().unwrap(),
            RepositoryLayout::Maven2
        );
        assert!("npm".parse::<RepositoryLayout>().is_err());
    }
}
