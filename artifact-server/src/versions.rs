//! Version queries over one artifact: its version list, one version's files
//! and the project summary read from the newest descriptor.

use crate::coordinate::{self, Coordinate};
use crate::descriptor::{self, DescriptorInfo};
use crate::error::{AppError, AppResult};
use crate::metadata::ArtifactMetadata;
use crate::namespace::tree::ChildEntry;
use crate::path::RelativePath;
use crate::resolver::{ReadResolution, ReadTarget, RepositoryResolver};
use crate::validation::MAX_DESCRIPTOR_SIZE;
use crate::version;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: String,
    pub snapshot: bool,
    pub modified: DateTime<Utc>,
}

/// Versions of one artifact, ascending.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionList {
    pub group_id: String,
    pub artifact_id: String,
    pub versions: Vec<VersionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetail {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub files: Vec<ChildEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(flatten)]
    pub versions: VersionList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorInfo>,
}

#[derive(Debug, Clone)]
pub struct VersionQueries {
    resolver: RepositoryResolver,
}

impl VersionQueries {
    pub fn new(resolver: RepositoryResolver) -> Self {
        VersionQueries { resolver }
    }

    /// Versions below the artifact directory `path` (`org/example/lib`).
    pub fn versions(&self, storage: &str, repository: &str, path: &RelativePath) -> AppResult<VersionList> {
        let tree = self.resolver.active_tree(storage, repository)?;
        let layout = tree.config().layout;
        let (group, artifact_id) = coordinate::artifact_from_dir(path, layout)?;

        let root = tree.snapshot();
        let metadata = ArtifactMetadata::collect_in(&root, path, &group, &artifact_id)
            .ok_or_else(|| AppError::NotFound(format!("No versions found under '{path}'")))?;

        let modified: Vec<(String, DateTime<Utc>)> = tree
            .lookup(path)?
            .children()
            .into_iter()
            .filter(|entry| entry.directory)
            .map(|entry| (entry.name, entry.modified))
            .collect();
        let versions = metadata
            .versions
            .iter()
            .map(|v| VersionEntry {
                snapshot: version::is_snapshot(v),
                modified: modified
                    .iter()
                    .find(|(name, _)| name == v)
                    .map_or(metadata.last_updated, |(_, at)| *at),
                version: v.clone(),
            })
            .collect();

        Ok(VersionList {
            group_id: metadata.group,
            artifact_id: metadata.artifact_id,
            versions,
            latest: metadata.latest,
            release: metadata.release,
            last_updated: metadata.last_updated,
        })
    }

    /// Files of the version directory `path` (`org/example/lib/1.0.0`).
    pub async fn version(&self, storage: &str, repository: &str, path: &RelativePath) -> AppResult<VersionDetail> {
        let tree = self.resolver.active_tree(storage, repository)?;
        let layout = tree.config().layout;
        let (Some(version), Some(artifact_dir)) = (path.file_name(), path.parent()) else {
            return Err(AppError::NotACoordinate {
                path: path.to_string(),
            });
        };
        let (group, artifact_id) = coordinate::artifact_from_dir(&artifact_dir, layout)?;

        let node = tree.lookup(path)?;
        if !node.is_directory() {
            return Err(AppError::NotFound(format!("'{path}' is not a version directory")));
        }

        let descriptor = self
            .descriptor(storage, repository, &group, &artifact_id, version)
            .await;
        Ok(VersionDetail {
            version: version.to_string(),
            files: node.children(),
            group_id: group,
            artifact_id,
            descriptor,
        })
    }

    /// Version list plus the descriptor of the newest release, or of the
    /// newest version when there is no release.
    pub async fn project(&self, storage: &str, repository: &str, path: &RelativePath) -> AppResult<ProjectInfo> {
        let versions = self.versions(storage, repository, path)?;
        let descriptor = match versions.release.as_ref().or(versions.latest.as_ref()) {
            Some(version) => {
                self.descriptor(storage, repository, &versions.group_id, &versions.artifact_id, version)
                    .await
            }
            None => None,
        };
        Ok(ProjectInfo {
            versions,
            descriptor,
        })
    }

    /// Descriptor of `group:artifact_id:version`, if one is stored and parses.
    async fn descriptor(
        &self,
        storage: &str,
        repository: &str,
        group: &str,
        artifact_id: &str,
        version: &str,
    ) -> Option<DescriptorInfo> {
        let coordinate = Coordinate::new(group, artifact_id, version, None, "pom").ok()?;
        let resolution = self
            .resolver
            .resolve_for_read(storage, repository, ReadTarget::Coordinate(coordinate))
            .ok()?;
        let ReadResolution::Artifact(artifact) = resolution else {
            return None;
        };
        if artifact.leaf.size > MAX_DESCRIPTOR_SIZE as u64 {
            debug!(path = %artifact.path, size = artifact.leaf.size, "Descriptor too large to summarize");
            return None;
        }

        let bytes = tokio::fs::read(&artifact.location).await.ok()?;
        match descriptor::parse(&bytes) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(path = %artifact.path, error = %e, "Stored descriptor does not parse");
                None
            }
        }
    }
}
