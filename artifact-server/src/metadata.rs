//! `maven-metadata.xml` generation.
//!
//! Metadata is derived from the tree, never uploaded: the artifact-level file
//! lists every version directory, the version-level file of a snapshot
//! directory names the newest timestamped build of each file kind.

use crate::coordinate::{self, Coordinate, RepositoryLayout};
use crate::descriptor::write_document;
use crate::error::AppResult;
use crate::namespace::tree::{self, Node};
use crate::path::RelativePath;
use crate::version::{self, SnapshotBuild};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// File name of a metadata document.
pub const METADATA_FILE: &str = "maven-metadata.xml";

fn last_updated(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Version listing of one `group:artifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub group: String,
    pub artifact_id: String,
    /// Ascending by version order.
    pub versions: Vec<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl ArtifactMetadata {
    /// Collect the versions of `coordinate`'s artifact from `root`.
    pub fn collect(root: &Arc<Node>, coordinate: &Coordinate, layout: RepositoryLayout) -> Option<Self> {
        Self::collect_in(
            root,
            &coordinate.artifact_dir(layout),
            &coordinate.group,
            &coordinate.artifact_id,
        )
    }

    /// Collect the version directories below the artifact directory `dir`.
    pub fn collect_in(root: &Arc<Node>, dir: &RelativePath, group: &str, artifact_id: &str) -> Option<Self> {
        let node = tree::lookup(root, dir.segments()).ok()?;

        let mut versions = node.child_directories();
        if versions.is_empty() {
            return None;
        }
        versions.sort_by(|a, b| version::compare_versions(a, b).then_with(|| a.cmp(b)));

        let latest = versions.last().cloned();
        let release = versions
            .iter()
            .rev()
            .find(|v| !version::is_snapshot(v))
            .cloned();

        Some(ArtifactMetadata {
            group: group.to_string(),
            artifact_id: artifact_id.to_string(),
            versions,
            latest,
            release,
            last_updated: node.modified(),
        })
    }

    pub fn path(coordinate: &Coordinate, layout: RepositoryLayout) -> RelativePath {
        let dir = coordinate.artifact_dir(layout);
        dir.join(METADATA_FILE).unwrap_or(dir)
    }

    pub fn render(&self) -> AppResult<String> {
        write_document(&MetadataDocument {
            model_version: None,
            group_id: self.group.clone(),
            artifact_id: self.artifact_id.clone(),
            version: None,
            versioning: Versioning {
                latest: self.latest.clone(),
                release: self.release.clone(),
                versions: Some(Versions {
                    version: self.versions.clone(),
                }),
                last_updated: Some(last_updated(self.last_updated)),
                ..Versioning::default()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
    pub updated: DateTime<Utc>,
}

/// Newest builds inside one `-SNAPSHOT` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub group: String,
    pub artifact_id: String,
    pub version: String,
    pub latest: SnapshotBuild,
    pub snapshot_versions: Vec<SnapshotVersion>,
    pub last_updated: DateTime<Utc>,
}

impl SnapshotMetadata {
    /// Collect the timestamped builds in the version directory of `coordinate`.
    /// Returns `None` when the directory holds no timestamped build.
    pub fn collect(root: &Arc<Node>, coordinate: &Coordinate, layout: RepositoryLayout) -> Option<Self> {
        let dir = coordinate.to_path(layout).parent()?;
        let node = tree::lookup(root, dir.segments()).ok()?;
        let Node::Directory(listing) = node.as_ref() else {
            return None;
        };

        let mut newest: BTreeMap<(Option<String>, String), (SnapshotBuild, SnapshotVersion)> =
            BTreeMap::new();
        for (name, child) in &listing.children {
            let Some(leaf) = child.as_leaf() else {
                continue;
            };
            let Ok(path) = dir.join(name) else {
                continue;
            };
            let Ok(candidate) = coordinate::from_path(&path, layout) else {
                continue;
            };
            if candidate.is_sidecar() {
                continue;
            }
            let Some(build) = SnapshotBuild::parse(&candidate.version) else {
                continue;
            };

            let key = (candidate.classifier.clone(), candidate.extension.clone());
            let newer = newest
                .get(&key)
                .map_or(true, |(current, _)| {
                    build.sort_key().cmp(&current.sort_key()) == Ordering::Greater
                });
            if newer {
                let entry = SnapshotVersion {
                    classifier: candidate.classifier,
                    extension: candidate.extension,
                    value: candidate.version,
                    updated: leaf.modified,
                };
                newest.insert(key, (build, entry));
            }
        }

        let latest = newest
            .values()
            .map(|(build, _)| build)
            .max_by(|a, b| a.sort_key().cmp(&b.sort_key()))?
            .clone();

        Some(SnapshotMetadata {
            group: coordinate.group.clone(),
            artifact_id: coordinate.artifact_id.clone(),
            version: latest.floating_version(),
            latest,
            snapshot_versions: newest.into_values().map(|(_, v)| v).collect(),
            last_updated: node.modified(),
        })
    }

    pub fn path(coordinate: &Coordinate, layout: RepositoryLayout) -> Option<RelativePath> {
        coordinate
            .to_path(layout)
            .parent()
            .and_then(|dir| dir.join(METADATA_FILE).ok())
    }

    pub fn render(&self) -> AppResult<String> {
        let snapshot_versions = self
            .snapshot_versions
            .iter()
            .map(|entry| SnapshotVersionEntry {
                classifier: entry.classifier.clone(),
                extension: entry.extension.clone(),
                value: entry.value.clone(),
                updated: last_updated(entry.updated),
            })
            .collect();
        write_document(&MetadataDocument {
            model_version: Some("1.1.0".to_string()),
            group_id: self.group.clone(),
            artifact_id: self.artifact_id.clone(),
            version: Some(self.version.clone()),
            versioning: Versioning {
                snapshot: Some(SnapshotEntry {
                    timestamp: self.latest.timestamp.clone(),
                    build_number: self.latest.build_number,
                }),
                last_updated: Some(last_updated(self.last_updated)),
                snapshot_versions: Some(SnapshotVersions {
                    snapshot_version: snapshot_versions,
                }),
                ..Versioning::default()
            },
        })
    }
}

/// Wire form of `maven-metadata.xml`, shared by both document levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "metadata", rename_all = "camelCase")]
pub struct MetadataDocument {
    #[serde(rename = "@modelVersion", default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub versioning: Versioning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_versions: Option<SnapshotVersions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub version: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub timestamp: String,
    pub build_number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotVersions {
    #[serde(default)]
    pub snapshot_version: Vec<SnapshotVersionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
    pub updated: String,
}
