//! # Repository Resolver
//!
//! Decides what a path or coordinate means inside one repository and whether a
//! write to it is allowed.
//!
//! - Release repositories reject snapshot versions, snapshot repositories
//!   reject release versions, mixed repositories accept both.
//! - Reading a `-SNAPSHOT` version from a repository that accepts snapshots
//!   returns the newest timestamped build, or the literal `-SNAPSHOT` file when
//!   no build has been deployed.
//! - Release artifacts are write-once; snapshot artifacts may be replaced.

use crate::coordinate::{self, Coordinate, RepositoryLayout};
use crate::error::{AppError, AppResult};
use crate::metadata::METADATA_FILE;
use crate::namespace::tree::{self, ChildEntry, Leaf, Node};
use crate::namespace::{NamespaceIndex, RepositoryTree};
use crate::path::RelativePath;
use crate::types::Repository;
use crate::version::{self, SnapshotBuild, SNAPSHOT_SUFFIX};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const CHECKSUM_SUFFIXES: &[&str] = &[".sha1", ".sha256", ".sha512", ".md5"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed,
    Rejected(String),
}

/// What a stored file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Primary,
    Descriptor,
    Checksum,
    Signature,
    Metadata,
}

impl ArtifactKind {
    pub fn of(file_name: &str, coordinate: Option<&Coordinate>) -> Self {
        if CHECKSUM_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
            ArtifactKind::Checksum
        } else if file_name.ends_with(".asc") {
            ArtifactKind::Signature
        } else if file_name.starts_with(METADATA_FILE) {
            ArtifactKind::Metadata
        } else if coordinate.is_some_and(Coordinate::is_descriptor) {
            ArtifactKind::Descriptor
        } else {
            ArtifactKind::Primary
        }
    }

    /// Content type served for this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Descriptor | ArtifactKind::Metadata => "application/xml",
            ArtifactKind::Checksum | ArtifactKind::Signature => "text/plain",
            ArtifactKind::Primary => "application/octet-stream",
        }
    }
}

/// How a read request names its target.
#[derive(Debug, Clone)]
pub enum ReadTarget {
    Path(RelativePath),
    Coordinate(Coordinate),
}

#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub path: RelativePath,
    pub coordinate: Option<Coordinate>,
    pub kind: ArtifactKind,
    pub leaf: Arc<Leaf>,
    /// Where the bytes live on disk.
    pub location: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ReadResolution {
    Artifact(ResolvedArtifact),
    Directory {
        path: RelativePath,
        entries: Vec<ChildEntry>,
    },
}

/// An accepted write.
#[derive(Debug, Clone)]
pub struct WriteTarget {
    pub repository: Repository,
    pub coordinate: Coordinate,
    pub path: RelativePath,
    /// A file is already stored at `path` (only possible for snapshots).
    pub exists: bool,
    /// The commit must find `path` still empty.
    pub expect_absent: bool,
}

/// Apply the repository's version policy to `coordinate`.
pub fn classify(repository: &Repository, coordinate: &Coordinate) -> Classification {
    let snapshot = coordinate.is_snapshot();
    if snapshot && !repository.policy.allows_snapshots() {
        return Classification::Rejected(format!(
            "snapshot version '{}' is not accepted by {} repository '{}'",
            coordinate.version, repository.policy, repository.name
        ));
    }
    if !snapshot && !repository.policy.allows_releases() {
        return Classification::Rejected(format!(
            "release version '{}' is not accepted by {} repository '{}'",
            coordinate.version, repository.policy, repository.name
        ));
    }
    Classification::Allowed
}

#[derive(Debug, Clone)]
pub struct RepositoryResolver {
    index: Arc<NamespaceIndex>,
}

impl RepositoryResolver {
    pub fn new(index: Arc<NamespaceIndex>) -> Self {
        RepositoryResolver { index }
    }

    pub fn index(&self) -> &Arc<NamespaceIndex> {
        &self.index
    }

    /// Tree of `storage/repository` if the repository is active.
    pub fn active_tree(&self, storage: &str, repository: &str) -> AppResult<Arc<RepositoryTree>> {
        let tree = self.index.repository(storage, repository)?;
        if !tree.config().active {
            return Err(AppError::RepositoryInactive {
                storage: storage.to_string(),
                repository: repository.to_string(),
            });
        }
        Ok(tree)
    }

    pub fn resolve_for_read(
        &self,
        storage: &str,
        repository: &str,
        target: ReadTarget,
    ) -> AppResult<ReadResolution> {
        let tree = self.active_tree(storage, repository)?;
        let config = tree.config();
        let root = tree.snapshot();

        let (path, coordinate) = match target {
            ReadTarget::Coordinate(c) => (c.to_path(config.layout), Some(c)),
            ReadTarget::Path(p) => {
                let c = coordinate::from_path(&p, config.layout).ok();
                (p, c)
            }
        };

        if let Some(c) = &coordinate {
            if config.policy.allows_snapshots() && version::is_canonical_floating_snapshot(&c.version) {
                if let Some(artifact) = latest_snapshot_build(&root, tree.root_dir(), c, config.layout) {
                    debug!(
                        storage,
                        repository,
                        requested = %path,
                        resolved = %artifact.path,
                        "Resolved snapshot to latest build"
                    );
                    return Ok(ReadResolution::Artifact(artifact));
                }
            }
        }

        let node = tree::lookup(&root, path.segments())?;
        Ok(match node.as_ref() {
            Node::Directory(_) => ReadResolution::Directory {
                entries: node.children(),
                path,
            },
            Node::Leaf(leaf) => {
                let kind = ArtifactKind::of(path.file_name().unwrap_or_default(), coordinate.as_ref());
                ReadResolution::Artifact(ResolvedArtifact {
                    leaf: Arc::clone(leaf),
                    location: path.to_fs_path(tree.root_dir()),
                    path,
                    coordinate,
                    kind,
                })
            }
        })
    }

    pub fn resolve_for_write(
        &self,
        storage: &str,
        repository: &str,
        coordinate: &Coordinate,
    ) -> AppResult<WriteTarget> {
        let tree = self.active_tree(storage, repository)?;
        let config = tree.config();

        if let Classification::Rejected(reason) = classify(&config, coordinate) {
            return Err(AppError::PolicyRejected(reason));
        }

        let path = coordinate.to_path(config.layout);
        let exists = match tree.lookup(&path) {
            Ok(node) if node.is_directory() => {
                return Err(AppError::PathConflict {
                    path: path.to_string(),
                    existing: "directory",
                })
            }
            Ok(_) => true,
            Err(AppError::PathTooDeep { leaf, .. }) => {
                return Err(AppError::PathConflict {
                    path: leaf,
                    existing: "artifact",
                })
            }
            Err(AppError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let snapshot = coordinate.is_snapshot();
        if exists && !snapshot {
            return Err(AppError::ImmutableArtifact {
                path: path.to_string(),
            });
        }

        Ok(WriteTarget {
            repository: config.as_ref().clone(),
            coordinate: coordinate.clone(),
            path,
            exists,
            expect_absent: !snapshot,
        })
    }
}

/// Newest timestamped build of the floating snapshot `requested` in `root`.
fn latest_snapshot_build(
    root: &Arc<Node>,
    root_dir: &Path,
    requested: &Coordinate,
    layout: RepositoryLayout,
) -> Option<ResolvedArtifact> {
    let requested_len = requested.version.len();
    let base = requested
        .version
        .get(..requested_len.checked_sub(SNAPSHOT_SUFFIX.len())?)?;
    let dir = requested.to_path(layout).parent()?;
    let node = tree::lookup(root, dir.segments()).ok()?;

    let Node::Directory(listing) = node.as_ref() else {
        return None;
    };

    listing
        .children
        .iter()
        .filter_map(|(name, child)| {
            let leaf = child.as_leaf()?;
            let path = dir.join(name).ok()?;
            let candidate = coordinate::from_path(&path, layout).ok()?;
            let build = SnapshotBuild::parse(&candidate.version)?;
            let same_artifact = build.base == base
                && candidate.classifier == requested.classifier
                && candidate.extension == requested.extension;
            same_artifact.then(|| (build, path, candidate, Arc::clone(leaf)))
        })
        .max_by(|(a, ..), (b, ..)| a.sort_key().cmp(&b.sort_key()))
        .map(|(_, path, candidate, leaf)| ResolvedArtifact {
            location: path.to_fs_path(root_dir),
            kind: ArtifactKind::of(path.file_name().unwrap_or_default(), Some(&candidate)),
            path,
            coordinate: Some(candidate),
            leaf,
        })
}
