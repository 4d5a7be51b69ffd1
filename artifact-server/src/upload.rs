//! # Upload Pipeline
//!
//! ```text
//! Received ──▶ Validated ──▶ Staged ──▶ Committed
//!                  │            │
//!                  ▼            ▼
//!              Rejected     RolledBack
//! ```
//!
//! - **Validated**: the coordinate parses, the repository policy accepts it, the
//!   target is writable, the declared checksum matches and a supplied
//!   descriptor describes the same artifact. Nothing has been written yet.
//! - **Staged**: artifact and descriptor sit in a private directory under
//!   `<data>/.staging`, bounded by the staging timeout.
//! - **Committed**: under the repository's commit lock the staged files, the
//!   regenerated `maven-metadata.xml` and its checksum are moved into place and
//!   the tree root is swapped once.
//!
//! Any failure drops the staging directory; a failed publish restores what it
//! displaced.

use crate::coordinate::{self, Coordinate};
use crate::descriptor;
use crate::error::{AppError, AppResult};
use crate::hash_utils::{sha1_hash, sha256_hash, verify_declared_checksum};
use crate::metadata::{ArtifactMetadata, SnapshotMetadata, METADATA_FILE};
use crate::namespace::tree::{self, Leaf, Node};
use crate::namespace::{CommitSession, RepositoryTree, StagedFile};
use crate::path::RelativePath;
use crate::resolver::{RepositoryResolver, WriteTarget};
use crate::types::DescriptorPolicy;
use crate::validation::{validate_file_size, MAX_UPLOAD_SIZE};
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// How the uploader named the artifact.
#[derive(Debug, Clone)]
pub enum CoordinateInput {
    Raw(String),
    Fields {
        group: String,
        artifact_id: String,
        version: String,
        classifier: Option<String>,
        extension: Option<String>,
    },
    /// Layout path of a raw deploy.
    Path(RelativePath),
}

/// Where the descriptor for a primary artifact comes from.
#[derive(Debug, Clone)]
pub enum DescriptorSource {
    Supplied(Bytes),
    /// Generated when the repository's descriptor policy asks for it.
    Absent,
    /// Deployed as its own file (raw deploys); never generated.
    Separate,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub storage: String,
    pub repository: String,
    pub coordinate: CoordinateInput,
    pub content: Bytes,
    pub declared_checksum: Option<String>,
    pub descriptor: DescriptorSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Received,
    Validated,
    Staged,
    Committed,
    Rejected,
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub storage: String,
    pub repository: String,
    pub coordinate: String,
    pub path: RelativePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_path: Option<RelativePath>,
    pub sha1: String,
    pub sha256: String,
    pub size: u64,
    pub overwritten: bool,
    pub states: Vec<UploadState>,
}

/// Result of a raw `PUT`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    Stored(UploadReceipt),
    /// Client-built metadata is dropped; the server writes its own.
    Ignored { path: RelativePath },
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_upload_size: u64,
    pub staging_timeout: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_upload_size: MAX_UPLOAD_SIZE,
            staging_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
enum DescriptorContent {
    Supplied(Bytes),
    Generated(Bytes),
}

impl DescriptorContent {
    fn bytes(&self) -> &Bytes {
        match self {
            DescriptorContent::Supplied(b) | DescriptorContent::Generated(b) => b,
        }
    }
}

#[derive(Debug, Clone)]
struct DescriptorPlan {
    path: RelativePath,
    content: DescriptorContent,
}

/// Tracks and logs the state machine of one upload.
struct Progress<'a> {
    storage: &'a str,
    repository: &'a str,
    label: String,
    states: Vec<UploadState>,
}

impl<'a> Progress<'a> {
    fn new(storage: &'a str, repository: &'a str, label: String) -> Self {
        let mut progress = Progress {
            storage,
            repository,
            label,
            states: Vec::new(),
        };
        progress.enter(UploadState::Received);
        progress
    }

    fn enter(&mut self, state: UploadState) {
        match state {
            UploadState::Rejected | UploadState::RolledBack => warn!(
                storage = %self.storage,
                repository = %self.repository,
                artifact = %self.label,
                state = ?state,
                "Upload state"
            ),
            _ => info!(
                storage = %self.storage,
                repository = %self.repository,
                artifact = %self.label,
                state = ?state,
                "Upload state"
            ),
        }
        self.states.push(state);
    }

    fn fail(&mut self, error: AppError) -> AppError {
        let state = if self.states.contains(&UploadState::Staged) {
            UploadState::RolledBack
        } else {
            UploadState::Rejected
        };
        self.enter(state);
        warn!(artifact = %self.label, error = %error, "Upload failed");
        error
    }
}

#[derive(Debug, Clone)]
pub struct UploadPipeline {
    resolver: RepositoryResolver,
    limits: UploadLimits,
}

impl UploadPipeline {
    pub fn new(resolver: RepositoryResolver, limits: UploadLimits) -> Self {
        UploadPipeline { resolver, limits }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Run one upload through every stage.
    pub async fn upload(&self, request: UploadRequest) -> AppResult<UploadReceipt> {
        let label = match &request.coordinate {
            CoordinateInput::Raw(raw) => raw.clone(),
            CoordinateInput::Fields {
                group,
                artifact_id,
                version,
                ..
            } => format!("{group}:{artifact_id}:{version}"),
            CoordinateInput::Path(path) => path.to_string(),
        };
        let mut progress = Progress::new(&request.storage, &request.repository, label);

        let tree = self
            .resolver
            .index()
            .repository(&request.storage, &request.repository)
            .map_err(|e| progress.fail(e))?;

        let (target, descriptor) = self
            .validate(&tree, &request)
            .map_err(|e| progress.fail(e))?;
        progress.label = target.coordinate.to_string();
        progress.enter(UploadState::Validated);

        let staging = self
            .stage(&request.content, descriptor.as_ref())
            .await
            .map_err(|e| progress.fail(e))?;
        progress.enter(UploadState::Staged);

        let outcome = self
            .commit(&tree, &target, &request.content, descriptor.as_ref(), &staging)
            .await
            .map_err(|e| progress.fail(e))?;
        progress.enter(UploadState::Committed);

        let leaf = Leaf::new(&request.content);
        Ok(UploadReceipt {
            storage: request.storage.clone(),
            repository: request.repository.clone(),
            coordinate: target.coordinate.to_string(),
            path: target.path.clone(),
            descriptor_path: outcome.descriptor_path,
            sha1: leaf.sha1,
            sha256: leaf.sha256,
            size: leaf.size,
            overwritten: outcome.overwritten,
            states: progress.states,
        })
    }

    /// Store the body of a raw `PUT` at a layout path.
    pub async fn deploy_path(
        &self,
        storage: &str,
        repository: &str,
        path: RelativePath,
        content: Bytes,
    ) -> AppResult<DeployOutcome> {
        if path
            .file_name()
            .is_some_and(|name| name.starts_with(METADATA_FILE))
        {
            // Still fail for unknown or inactive repositories.
            self.resolver.active_tree(storage, repository)?;
            debug!(storage, repository, path = %path, "Ignoring client-supplied metadata");
            return Ok(DeployOutcome::Ignored { path });
        }

        let receipt = self
            .upload(UploadRequest {
                storage: storage.to_string(),
                repository: repository.to_string(),
                coordinate: CoordinateInput::Path(path),
                content,
                declared_checksum: None,
                descriptor: DescriptorSource::Separate,
            })
            .await?;
        Ok(DeployOutcome::Stored(receipt))
    }

    fn validate(
        &self,
        tree: &RepositoryTree,
        request: &UploadRequest,
    ) -> AppResult<(WriteTarget, Option<DescriptorPlan>)> {
        let config = tree.config();
        let coordinate = match &request.coordinate {
            CoordinateInput::Raw(raw) => Coordinate::parse(raw)?,
            CoordinateInput::Fields {
                group,
                artifact_id,
                version,
                classifier,
                extension,
            } => Coordinate::new(
                group.trim(),
                artifact_id.trim(),
                version.trim(),
                classifier.as_ref().map(|c| c.trim().to_string()),
                extension
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(coordinate::DEFAULT_EXTENSION),
            )?,
            CoordinateInput::Path(path) => coordinate::from_path(path, config.layout)?,
        };

        validate_file_size(request.content.len() as u64, Some(self.limits.max_upload_size))?;

        let target =
            self.resolver
                .resolve_for_write(&request.storage, &request.repository, &coordinate)?;

        if let Some(declared) = request
            .declared_checksum
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            verify_declared_checksum(declared, &request.content)?;
        }

        let content = match (&request.descriptor, coordinate.has_descriptor()) {
            (DescriptorSource::Supplied(bytes), true) => {
                descriptor::validate(bytes, &coordinate)?;
                Some(DescriptorContent::Supplied(bytes.clone()))
            }
            (DescriptorSource::Supplied(_), false) => {
                return Err(AppError::BadRequest(format!(
                    "A descriptor can only accompany a primary artifact, not '{coordinate}'"
                )))
            }
            (DescriptorSource::Absent, true) if config.descriptor == DescriptorPolicy::Generate => {
                Some(DescriptorContent::Generated(Bytes::from(descriptor::generate(
                    &coordinate,
                )?)))
            }
            _ => None,
        };

        let plan = match content {
            Some(content) => {
                let path = coordinate.descriptor().to_path(config.layout);
                let root = tree.snapshot();
                if descriptor_needed(&root, &path, &content, coordinate.is_snapshot())? {
                    Some(DescriptorPlan { path, content })
                } else {
                    None
                }
            }
            None => None,
        };

        Ok((target, plan))
    }

    async fn stage(&self, content: &Bytes, descriptor: Option<&DescriptorPlan>) -> AppResult<Staging> {
        let staging_root = self.resolver.index().staging_root().to_path_buf();
        let timeout = self.limits.staging_timeout;

        let work = async {
            let dir = tempfile::Builder::new()
                .prefix("upload-")
                .tempdir_in(&staging_root)?;
            let artifact = dir.path().join("artifact");
            tokio::fs::write(&artifact, content).await?;

            let descriptor = match descriptor {
                Some(plan) => {
                    let staged = dir.path().join("descriptor");
                    tokio::fs::write(&staged, plan.content.bytes()).await?;
                    Some(staged)
                }
                None => None,
            };
            Ok::<_, AppError>(Staging {
                dir,
                artifact,
                descriptor,
            })
        };

        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| AppError::StagingTimeout {
                stage: "staging",
                seconds: timeout.as_secs(),
            })?
    }

    async fn commit(
        &self,
        tree: &Arc<RepositoryTree>,
        target: &WriteTarget,
        content: &Bytes,
        descriptor: Option<&DescriptorPlan>,
        staging: &Staging,
    ) -> AppResult<CommitSummary> {
        let layout = target.repository.layout;
        let coordinate = &target.coordinate;
        let snapshot = coordinate.is_snapshot();

        let mut session = tree.begin_commit(self.limits.staging_timeout).await?;

        session.add(StagedFile {
            path: target.path.clone(),
            staged_at: staging.artifact.clone(),
            leaf: Arc::new(Leaf::new(content)),
            expect_absent: target.expect_absent,
        })?;

        let mut descriptor_path = None;
        if let (Some(plan), Some(staged_at)) = (descriptor, &staging.descriptor) {
            // Another upload may have committed the descriptor since validation.
            if descriptor_needed(session.base_root(), &plan.path, &plan.content, snapshot)? {
                session.add(StagedFile {
                    path: plan.path.clone(),
                    staged_at: staged_at.clone(),
                    leaf: Arc::new(Leaf::new(plan.content.bytes())),
                    expect_absent: !snapshot,
                })?;
                descriptor_path = Some(plan.path.clone());
            }
        }

        if !coordinate.is_sidecar() {
            let mut documents = Vec::new();
            if let Some(metadata) = ArtifactMetadata::collect(session.working_root(), coordinate, layout) {
                documents.push((ArtifactMetadata::path(coordinate, layout), metadata.render()?));
            }
            if snapshot {
                if let (Some(metadata), Some(path)) = (
                    SnapshotMetadata::collect(session.working_root(), coordinate, layout),
                    SnapshotMetadata::path(coordinate, layout),
                ) {
                    documents.push((path, metadata.render()?));
                }
            }
            for (index, (path, xml)) in documents.into_iter().enumerate() {
                stage_metadata(&mut session, staging.dir.path(), index, path, xml).await?;
            }
        }

        let outcome = session.publish().await?;
        Ok(CommitSummary {
            overwritten: outcome.overwritten.contains(&target.path),
            descriptor_path,
        })
    }
}

struct Staging {
    dir: TempDir,
    artifact: std::path::PathBuf,
    descriptor: Option<std::path::PathBuf>,
}

struct CommitSummary {
    overwritten: bool,
    descriptor_path: Option<RelativePath>,
}

/// Whether the descriptor at `path` still has to be written.
///
/// An existing descriptor is kept unless a different one is supplied for a
/// snapshot; a different one supplied for a release is an immutability error.
fn descriptor_needed(
    root: &Arc<Node>,
    path: &RelativePath,
    content: &DescriptorContent,
    snapshot: bool,
) -> AppResult<bool> {
    let existing = match tree::lookup(root, path.segments()) {
        Ok(node) => node,
        Err(AppError::NotFound(_)) => return Ok(true),
        Err(AppError::PathTooDeep { leaf, .. }) => {
            return Err(AppError::PathConflict {
                path: leaf,
                existing: "artifact",
            })
        }
        Err(e) => return Err(e),
    };
    let Some(leaf) = existing.as_leaf() else {
        return Err(AppError::PathConflict {
            path: path.to_string(),
            existing: "directory",
        });
    };

    match content {
        DescriptorContent::Generated(_) => Ok(false),
        DescriptorContent::Supplied(bytes) if leaf.sha256 == sha256_hash(bytes) => Ok(false),
        DescriptorContent::Supplied(_) if snapshot => Ok(true),
        DescriptorContent::Supplied(_) => Err(AppError::ImmutableArtifact {
            path: path.to_string(),
        }),
    }
}

async fn stage_metadata(
    session: &mut CommitSession,
    dir: &Path,
    index: usize,
    path: RelativePath,
    xml: String,
) -> AppResult<()> {
    let checksum = sha1_hash(xml.as_bytes());
    let checksum_path = match path.parent() {
        Some(parent) => parent.join(&format!("{METADATA_FILE}.sha1"))?,
        None => return Ok(()),
    };

    let staged_xml = dir.join(format!("metadata-{index}"));
    let staged_sha1 = dir.join(format!("metadata-{index}.sha1"));
    tokio::fs::write(&staged_xml, xml.as_bytes()).await?;
    tokio::fs::write(&staged_sha1, checksum.as_bytes()).await?;

    session.add(StagedFile {
        path,
        staged_at: staged_xml,
        leaf: Arc::new(Leaf::new(xml.as_bytes())),
        expect_absent: false,
    })?;
    session.add(StagedFile {
        path: checksum_path,
        staged_at: staged_sha1,
        leaf: Arc::new(Leaf::new(checksum.as_bytes())),
        expect_absent: false,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceIndex;
    use crate::types::{Repository, VersionPolicy};

    async fn pipeline(policy: VersionPolicy) -> (tempfile::TempDir, UploadPipeline) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let index = NamespaceIndex::open(temp_dir.path()).unwrap();
        let storage = index.create_storage("local").await.unwrap();
        index
            .create_repository(storage.id, Repository::new("repo", policy))
            .await
            .unwrap();
        let resolver = RepositoryResolver::new(Arc::new(index));
        (temp_dir, UploadPipeline::new(resolver, UploadLimits::default()))
    }

    fn request(coordinate: &str, content: &'static [u8]) -> UploadRequest {
        UploadRequest {
            storage: "local".to_string(),
            repository: "repo".to_string(),
            coordinate: CoordinateInput::Raw(coordinate.to_string()),
            content: Bytes::from_static(content),
            declared_checksum: None,
            descriptor: DescriptorSource::Absent,
        }
    }

    fn exists(pipeline: &UploadPipeline, path: &str) -> bool {
        pipeline
            .resolver
            .index()
            .exists("local", "repo", &RelativePath::parse(path).unwrap())
    }

    #[tokio::test]
    async fn test_upload_generates_descriptor_and_metadata() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Release).await;

        let receipt = pipeline
            .upload(request("org.example:lib:1.0.0", b"jar"))
            .await
            .unwrap();

        assert_eq!(receipt.path.to_string(), "org/example/lib/1.0.0/lib-1.0.0.jar");
        assert_eq!(
            receipt.descriptor_path.unwrap().to_string(),
            "org/example/lib/1.0.0/lib-1.0.0.pom"
        );
        assert_eq!(
            receipt.states,
            vec![
                UploadState::Received,
                UploadState::Validated,
                UploadState::Staged,
                UploadState::Committed
            ]
        );
        assert!(exists(&pipeline, "org/example/lib/maven-metadata.xml"));
        assert!(exists(&pipeline, "org/example/lib/maven-metadata.xml.sha1"));
    }

    #[tokio::test]
    async fn test_release_is_immutable() {
        let (dir, pipeline) = pipeline(VersionPolicy::Release).await;
        let first = pipeline.upload(request("g:lib:1.0", b"one")).await.unwrap();

        assert!(matches!(
            pipeline.upload(request("g:lib:1.0", b"two")).await,
            Err(AppError::ImmutableArtifact { .. })
        ));

        let stored = std::fs::read(dir.path().join("storages/local/repo/g/lib/1.0/lib-1.0.jar")).unwrap();
        assert_eq!(stored, b"one");
        let leaf = pipeline
            .resolver
            .index()
            .repository("local", "repo")
            .unwrap()
            .lookup(&RelativePath::parse("g/lib/1.0/lib-1.0.jar").unwrap())
            .unwrap();
        assert_eq!(leaf.as_leaf().unwrap().sha1, first.sha1);
    }

    #[tokio::test]
    async fn test_snapshot_can_be_overwritten() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Snapshot).await;
        pipeline.upload(request("g:lib:1.0-SNAPSHOT", b"one")).await.unwrap();
        let receipt = pipeline
            .upload(request("g:lib:1.0-SNAPSHOT", b"two"))
            .await
            .unwrap();
        assert!(receipt.overwritten);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_writes_nothing() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Release).await;
        let mut req = request("g:lib:1.0", b"content");
        req.declared_checksum = Some(sha1_hash(b"other"));

        assert!(matches!(
            pipeline.upload(req).await,
            Err(AppError::ChecksumMismatch { .. })
        ));
        assert!(!exists(&pipeline, "g"));
    }

    #[tokio::test]
    async fn test_descriptor_policy_none() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let index = NamespaceIndex::open(temp_dir.path()).unwrap();
        let storage = index.create_storage("local").await.unwrap();
        let mut repository = Repository::new("repo", VersionPolicy::Release);
        repository.descriptor = DescriptorPolicy::None;
        index.create_repository(storage.id, repository).await.unwrap();
        let pipeline = UploadPipeline::new(
            RepositoryResolver::new(Arc::new(index)),
            UploadLimits::default(),
        );

        let receipt = pipeline.upload(request("g:lib:1.0", b"x")).await.unwrap();
        assert!(receipt.descriptor_path.is_none());
        assert!(!exists(&pipeline, "g/lib/1.0/lib-1.0.pom"));
    }

    #[tokio::test]
    async fn test_supplied_descriptor_must_match() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Release).await;
        let mut req = request("g:lib:1.0", b"x");
        req.descriptor = DescriptorSource::Supplied(Bytes::from(descriptor::generate(
            &Coordinate::parse("g:other:1.0").unwrap(),
        )
        .unwrap()));

        assert!(matches!(
            pipeline.upload(req).await,
            Err(AppError::InvalidDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn test_raw_deploy_and_ignored_metadata() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Release).await;

        let outcome = pipeline
            .deploy_path(
                "local",
                "repo",
                RelativePath::parse("g/lib/1.0/lib-1.0.jar").unwrap(),
                Bytes::from_static(b"jar"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DeployOutcome::Stored(_)));
        assert!(!exists(&pipeline, "g/lib/1.0/lib-1.0.pom"));

        let ignored = pipeline
            .deploy_path(
                "local",
                "repo",
                RelativePath::parse("g/lib/maven-metadata.xml").unwrap(),
                Bytes::from_static(b"<metadata/>"),
            )
            .await
            .unwrap();
        assert!(matches!(ignored, DeployOutcome::Ignored { .. }));

        assert!(matches!(
            pipeline
                .deploy_path(
                    "local",
                    "repo",
                    RelativePath::parse("g/lib/readme.txt").unwrap(),
                    Bytes::from_static(b"x"),
                )
                .await,
            Err(AppError::NotACoordinate { .. })
        ));
    }

    #[tokio::test]
    async fn test_timestamped_snapshot_writes_version_metadata() {
        let (_dir, pipeline) = pipeline(VersionPolicy::Snapshot).await;
        pipeline
            .upload(request("g:lib:1.0-20240101.120000-1", b"x"))
            .await
            .unwrap();

        assert!(exists(&pipeline, "g/lib/1.0-SNAPSHOT/maven-metadata.xml"));
        assert!(exists(&pipeline, "g/lib/1.0-SNAPSHOT/lib-1.0-20240101.120000-1.jar"));
        assert!(exists(&pipeline, "g/lib/maven-metadata.xml"));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let index = NamespaceIndex::open(temp_dir.path()).unwrap();
        let storage = index.create_storage("local").await.unwrap();
        index
            .create_repository(storage.id, Repository::new("repo", VersionPolicy::Release))
            .await
            .unwrap();
        let pipeline = UploadPipeline::new(
            RepositoryResolver::new(Arc::new(index)),
            UploadLimits {
                max_upload_size: 2,
                staging_timeout: Duration::from_secs(5),
            },
        );

        let error = pipeline.upload(request("g:lib:1.0", b"too big")).await.unwrap_err();
        assert_eq!(
            error.error_code(),
            crate::error::ErrorCode::PayloadTooLarge
        );
    }
}
