//! Read-only view over storages, repositories and repository contents.

use crate::error::{AppError, AppResult};
use crate::namespace::{ChildEntry, NamespaceIndex};
use crate::path::RelativePath;
use crate::resolver::{ArtifactKind, ReadResolution, ReadTarget, RepositoryResolver};
use crate::types::{Repository, Storage, Visibility};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    pub name: String,
    pub full_path: String,
    pub directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<String>,
    pub kind: ArtifactKind,
    pub size: u64,
    pub sha1: String,
    pub sha256: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BrowseResult {
    Storages(Vec<ListingEntry>),
    Repositories(Vec<ListingEntry>),
    Directory(Vec<ListingEntry>),
    Artifact(ArtifactSummary),
}

#[derive(Debug, Clone)]
pub struct BrowseService {
    resolver: RepositoryResolver,
}

impl BrowseService {
    pub fn new(resolver: RepositoryResolver) -> Self {
        BrowseService { resolver }
    }

    fn index(&self) -> &Arc<NamespaceIndex> {
        self.resolver.index()
    }

    pub fn list_storages(&self) -> Vec<Storage> {
        self.index().storages()
    }

    pub fn list_repositories(&self, storage_id: i64) -> AppResult<Vec<Repository>> {
        self.index()
            .storage_by_id(storage_id)
            .map(|storage| storage.repositories)
            .ok_or_else(|| AppError::NotFound(format!("Storage {storage_id} not found")))
    }

    /// Absent storage lists storages, absent repository lists the storage's
    /// repositories except hidden ones, otherwise the path inside the
    /// repository is resolved.
    pub fn browse(
        &self,
        storage: Option<&str>,
        repository: Option<&str>,
        path: &RelativePath,
    ) -> AppResult<BrowseResult> {
        let Some(storage) = storage else {
            let entries = self
                .list_storages()
                .into_iter()
                .map(|s| ListingEntry {
                    full_path: s.name.clone(),
                    name: s.name,
                    directory: true,
                    file_size: None,
                    modified: s.created,
                })
                .collect();
            return Ok(BrowseResult::Storages(entries));
        };

        let Some(repository) = repository else {
            let found = self
                .index()
                .storage_by_name(storage)
                .ok_or_else(|| AppError::NotFound(format!("Storage '{storage}' not found")))?;
            let entries = found
                .repositories
                .into_iter()
                .filter(|r| r.visibility != Visibility::Hidden)
                .map(|r| ListingEntry {
                    full_path: format!("{storage}/{}", r.name),
                    name: r.name,
                    directory: true,
                    file_size: None,
                    modified: r.created,
                })
                .collect();
            return Ok(BrowseResult::Repositories(entries));
        };

        match self
            .resolver
            .resolve_for_read(storage, repository, ReadTarget::Path(path.clone()))?
        {
            ReadResolution::Directory { path, entries } => Ok(BrowseResult::Directory(
                listing(storage, repository, &path, entries),
            )),
            ReadResolution::Artifact(artifact) => Ok(BrowseResult::Artifact(ArtifactSummary {
                path: artifact.path.to_string(),
                coordinate: artifact.coordinate.map(|c| c.to_string()),
                kind: artifact.kind,
                size: artifact.leaf.size,
                sha1: artifact.leaf.sha1.clone(),
                sha256: artifact.leaf.sha256.clone(),
                modified: artifact.leaf.modified,
            })),
        }
    }
}

fn listing(
    storage: &str,
    repository: &str,
    dir: &RelativePath,
    entries: Vec<ChildEntry>,
) -> Vec<ListingEntry> {
    entries
        .into_iter()
        .map(|entry| {
            let full_path = if dir.is_root() {
                format!("{storage}/{repository}/{}", entry.name)
            } else {
                format!("{storage}/{repository}/{dir}/{}", entry.name)
            };
            ListingEntry {
                name: entry.name,
                full_path,
                directory: entry.directory,
                file_size: entry.size,
                modified: entry.modified,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionPolicy;
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn service() -> (TempDir, BrowseService) {
        let temp_dir = TempDir::new().unwrap();
        let index = NamespaceIndex::open(temp_dir.path()).unwrap();
        let storage = index.create_storage("local").await.unwrap();
        index
            .create_repository(storage.id, Repository::new("releases", VersionPolicy::Release))
            .await
            .unwrap();
        index
            .insert(
                "local",
                "releases",
                &RelativePath::parse("org/example/lib/1.0.0/lib-1.0.0.jar").unwrap(),
                Bytes::from_static(b"jar"),
            )
            .await
            .unwrap();
        let service = BrowseService::new(RepositoryResolver::new(Arc::new(index)));
        (temp_dir, service)
    }

    #[tokio::test]
    async fn test_browse_levels() {
        let (_dir, service) = service().await;

        let BrowseResult::Storages(storages) = service.browse(None, None, &RelativePath::root()).unwrap() else {
            panic!("expected storages");
        };
        assert_eq!(storages[0].name, "local");

        let BrowseResult::Repositories(repos) =
            service.browse(Some("local"), None, &RelativePath::root()).unwrap()
        else {
            panic!("expected repositories");
        };
        assert_eq!(repos[0].full_path, "local/releases");

        let BrowseResult::Directory(entries) = service
            .browse(
                Some("local"),
                Some("releases"),
                &RelativePath::parse("org/example/lib/1.0.0").unwrap(),
            )
            .unwrap()
        else {
            panic!("expected a directory");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].full_path,
            "local/releases/org/example/lib/1.0.0/lib-1.0.0.jar"
        );
        assert_eq!(entries[0].file_size, Some(3));
        assert!(!entries[0].directory);
    }

    #[tokio::test]
    async fn test_browse_artifact_and_errors() {
        let (_dir, service) = service().await;
        let path = RelativePath::parse("org/example/lib/1.0.0/lib-1.0.0.jar").unwrap();

        let BrowseResult::Artifact(artifact) = service.browse(Some("local"), Some("releases"), &path).unwrap() else {
            panic!("expected an artifact");
        };
        assert_eq!(artifact.coordinate.as_deref(), Some("org.example:lib:1.0.0"));
        assert_eq!(artifact.kind, ArtifactKind::Primary);

        assert!(matches!(
            service.browse(Some("local"), Some("releases"), &path.join("extra").unwrap()),
            Err(AppError::PathTooDeep { .. })
        ));
        assert!(matches!(
            service.browse(Some("nope"), None, &RelativePath::root()),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(service.list_repositories(99), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_hidden_repository_is_unlisted_but_browsable() {
        let (_dir, service) = service().await;
        let storage = service.index().storage_by_name("local").unwrap();
        service
            .index()
            .update_repository(
                storage.id,
                "releases",
                &crate::types::RepositorySettings {
                    visibility: Some(Visibility::Hidden),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let BrowseResult::Repositories(repos) =
            service.browse(Some("local"), None, &RelativePath::root()).unwrap()
        else {
            panic!("expected repositories");
        };
        assert!(repos.is_empty());

        assert!(matches!(
            service.browse(Some("local"), Some("releases"), &RelativePath::root()),
            Ok(BrowseResult::Directory(_))
        ));
    }

    #[test]
    fn test_browse_result_serialization() {
        let json = serde_json::to_value(BrowseResult::Storages(Vec::new())).unwrap();
        assert_eq!(json["type"], "storages");
        assert!(json["data"].is_array());
    }
}
