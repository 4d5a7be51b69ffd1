//! One repository: its configuration, the current tree snapshot and the
//! commit lock that serializes writers.

use crate::error::{AppError, AppResult};
use crate::namespace::tree::{self, Leaf, Node};
use crate::path::RelativePath;
use crate::storage;
use crate::types::Repository;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct RepositoryTree {
    config: ArcSwap<Repository>,
    storage: String,
    root_dir: PathBuf,
    staging_root: PathBuf,
    root: ArcSwap<Node>,
    commit_lock: Arc<Mutex<()>>,
    retired: AtomicBool,
}

impl std::fmt::Debug for RepositoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryTree")
            .field("storage", &self.storage)
            .field("repository", &self.config.load().name)
            .field("root_dir", &self.root_dir)
            .finish()
    }
}

impl RepositoryTree {
    /// Open a repository directory, rebuilding the tree from the files in it.
    pub fn open(
        storage: &str,
        config: Repository,
        root_dir: PathBuf,
        staging_root: PathBuf,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(&root_dir)?;
        let root = rebuild_from_disk(&root_dir)?;

        Ok(RepositoryTree {
            config: ArcSwap::from_pointee(config),
            storage: storage.to_string(),
            root_dir,
            staging_root,
            root: ArcSwap::from_pointee(root),
            commit_lock: Arc::new(Mutex::new(())),
            retired: AtomicBool::new(false),
        })
    }

    /// Current settings. Like the root, a later update does not affect the
    /// returned value.
    pub fn config(&self) -> Arc<Repository> {
        self.config.load_full()
    }

    fn name(&self) -> String {
        self.config.load().name.clone()
    }

    pub fn storage_name(&self) -> &str {
        &self.storage
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Current root. Never blocks; later commits do not affect the returned value.
    pub fn snapshot(&self) -> Arc<Node> {
        self.root.load_full()
    }

    pub fn lookup(&self, path: &RelativePath) -> AppResult<Arc<Node>> {
        tree::lookup(&self.snapshot(), path.segments())
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Take the commit lock, waiting at most `timeout`.
    pub async fn lock(&self, timeout: Duration) -> AppResult<OwnedMutexGuard<()>> {
        let guard = tokio::time::timeout(timeout, Arc::clone(&self.commit_lock).lock_owned())
            .await
            .map_err(|_| AppError::StagingTimeout {
                stage: "waiting for the commit lock",
                seconds: timeout.as_secs(),
            })?;

        if self.is_retired() {
            return Err(AppError::NotFound(format!(
                "Repository '{}/{}' was deleted",
                self.storage,
                self.name()
            )));
        }
        Ok(guard)
    }

    /// Mark the repository as deleted. Callers hold the commit lock.
    pub(crate) fn retire(&self, _guard: &OwnedMutexGuard<()>) {
        self.retired.store(true, Ordering::Release);
    }

    /// Swap in updated settings. Callers hold the commit lock, so no commit
    /// runs against the old ones.
    pub(crate) fn replace_config(&self, _guard: &OwnedMutexGuard<()>, config: Repository) {
        self.config.store(Arc::new(config));
    }

    /// Start a commit: acquire the lock and take the current root as the base.
    ///
    /// `timeout` bounds both the wait for the lock and, counted again from
    /// acquiring it, the time until the session is published.
    pub async fn begin_commit(self: &Arc<Self>, timeout: Duration) -> AppResult<CommitSession> {
        let guard = self.lock(timeout).await?;
        let base = self.snapshot();
        Ok(CommitSession {
            tree: Arc::clone(self),
            _guard: guard,
            base: Arc::clone(&base),
            working: base,
            files: Vec::new(),
            deadline: Instant::now() + timeout,
            timeout,
        })
    }

    /// Remove a file or directory subtree.
    pub async fn remove(&self, path: &RelativePath, timeout: Duration) -> AppResult<()> {
        let _guard = self.lock(timeout).await?;
        let current = self.snapshot();
        let node = tree::lookup(&current, path.segments())?;
        let next = tree::without(&current, path.segments())?;

        let target = path.to_fs_path(&self.root_dir);
        match node.as_ref() {
            Node::Leaf(_) => fs::remove_file(&target).await?,
            Node::Directory(_) => storage::remove_dir_if_exists(&target).await?,
        }
        if let Some(parent) = target.parent() {
            storage::prune_empty_dirs(parent, &self.root_dir).await;
        }

        self.root.store(Arc::new(next));
        info!(
            storage = %self.storage,
            repository = %self.name(),
            path = %path,
            "Removed path"
        );
        Ok(())
    }
}

/// A file waiting in the staging directory to be published.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: RelativePath,
    pub staged_at: PathBuf,
    pub leaf: Arc<Leaf>,
    /// Fail with `ConcurrentWriteConflict` if another writer committed this path
    /// after it was checked.
    pub expect_absent: bool,
}

/// What a commit replaced.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub published: Vec<RelativePath>,
    pub overwritten: Vec<RelativePath>,
}

/// An open commit holding the repository's lock.
///
/// Files added with [`CommitSession::add`] are visible through
/// [`CommitSession::working_root`] but to nobody else until
/// [`CommitSession::publish`]. Dropping the session discards them.
pub struct CommitSession {
    tree: Arc<RepositoryTree>,
    _guard: OwnedMutexGuard<()>,
    base: Arc<Node>,
    working: Arc<Node>,
    files: Vec<StagedFile>,
    deadline: Instant,
    timeout: Duration,
}

impl CommitSession {
    pub fn repository(&self) -> Arc<Repository> {
        self.tree.config()
    }

    /// Root as it will look after publishing.
    pub fn working_root(&self) -> &Arc<Node> {
        &self.working
    }

    /// Root as readers currently see it.
    pub fn base_root(&self) -> &Arc<Node> {
        &self.base
    }

    pub fn add(&mut self, file: StagedFile) -> AppResult<()> {
        if file.expect_absent {
            if let Ok(existing) = tree::lookup(&self.working, file.path.segments()) {
                if existing.as_leaf().is_some() {
                    return Err(AppError::ConcurrentWriteConflict {
                        path: file.path.to_string(),
                    });
                }
            }
        }

        let next = tree::with_leaf(&self.working, file.path.segments(), Arc::clone(&file.leaf))?;
        self.working = Arc::new(next);
        self.files.push(file);
        Ok(())
    }

    /// Move every staged file into place and swap the root once.
    ///
    /// If any rename fails, or the session's deadline passes before the root
    /// is swapped, files already moved are reverted and the displaced
    /// originals restored before the error is returned; the root is not swapped.
    pub async fn publish(self) -> AppResult<CommitOutcome> {
        let tree = Arc::clone(&self.tree);
        let backup_dir = tempfile::Builder::new()
            .prefix("backup-")
            .tempdir_in(&tree.staging_root)?;

        let mut moved: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(self.files.len());
        let mut outcome = CommitOutcome::default();
        let expired = || AppError::StagingTimeout {
            stage: "committing",
            seconds: self.timeout.as_secs(),
        };

        for (index, file) in self.files.iter().enumerate() {
            if Instant::now() >= self.deadline {
                warn!(
                    storage = %tree.storage,
                    repository = %tree.name(),
                    placed = moved.len(),
                    "Commit deadline passed, rolling back"
                );
                rollback(moved).await;
                return Err(expired());
            }

            let target = file.path.to_fs_path(&tree.root_dir);
            match place_file(&file.staged_at, &target, backup_dir.path(), index).await {
                Ok(backup) => {
                    if backup.is_some() {
                        outcome.overwritten.push(file.path.clone());
                    }
                    outcome.published.push(file.path.clone());
                    moved.push((target, backup));
                }
                Err(e) => {
                    error!(
                        storage = %tree.storage,
                        repository = %tree.name(),
                        path = %file.path,
                        error = %e,
                        "Commit failed, rolling back"
                    );
                    rollback(moved).await;
                    return Err(e);
                }
            }
        }

        if Instant::now() >= self.deadline {
            warn!(
                storage = %tree.storage,
                repository = %tree.name(),
                placed = moved.len(),
                "Commit deadline passed, rolling back"
            );
            rollback(moved).await;
            return Err(expired());
        }

        tree.root.store(Arc::clone(&self.working));
        info!(
            storage = %tree.storage,
            repository = %tree.name(),
            files = outcome.published.len(),
            overwritten = outcome.overwritten.len(),
            "Commit published"
        );
        Ok(outcome)
    }
}

async fn place_file(
    staged: &Path,
    target: &Path,
    backup_dir: &Path,
    index: usize,
) -> AppResult<Option<PathBuf>> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }

    let backup = if fs::try_exists(target).await? {
        let backup = backup_dir.join(index.to_string());
        fs::rename(target, &backup).await?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staged, target).await {
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, target).await;
        }
        return Err(e.into());
    }
    Ok(backup)
}

async fn rollback(moved: Vec<(PathBuf, Option<PathBuf>)>) {
    for (target, backup) in moved.into_iter().rev() {
        let restored = match backup {
            Some(backup) => fs::rename(&backup, &target).await,
            None => fs::remove_file(&target).await,
        };
        if let Err(e) = restored {
            warn!(path = %target.display(), error = %e, "Rollback step failed");
        }
    }
}

fn rebuild_from_disk(root_dir: &Path) -> AppResult<Node> {
    let mut root = Node::default();
    let mut files = 0usize;

    for entry in WalkDir::new(root_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AppError::StorageUnavailable(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walkdir loop detected")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root_dir) else {
            continue;
        };
        let segments: Option<Vec<String>> = relative
            .components()
            .map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect();
        let path = match segments.map(RelativePath::from_segments) {
            Some(Ok(path)) => path,
            _ => {
                warn!(path = %entry.path().display(), "Skipping file with an invalid repository path");
                continue;
            }
        };

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        let leaf = Arc::new(Leaf::from_file(entry.path(), modified)?);

        match tree::with_leaf(&root, path.segments(), leaf) {
            Ok(next) => {
                root = next;
                files += 1;
            }
            Err(e) => warn!(path = %path, error = %e, "Skipping conflicting file"),
        }
    }

    debug!(root = %root_dir.display(), files, "Rebuilt repository tree from disk");
    Ok(root)
}
