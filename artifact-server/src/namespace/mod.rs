//! # Namespace Index
//!
//! Storage → Repository → path tree, persisted under the data directory:
//!
//! ```text
//! <data>/
//!   storages.json                      registry of storages and repositories
//!   storages/<storage>/<repository>/…  artifact files, mirrored by the tree
//!   .staging/                          uploads in flight and commit backups
//! ```
//!
//! Reads load the current `Arc` snapshot of the storage map and of a
//! repository's root and never wait on writers. Writers of one repository are
//! serialized by that repository's commit lock; registry changes by a single
//! admin lock.

pub mod repository;
pub mod tree;

pub use repository::{CommitOutcome, CommitSession, RepositoryTree, StagedFile};
pub use tree::{ChildEntry, Leaf, Node};

use crate::error::{AppError, AppResult};
use crate::path::RelativePath;
use crate::storage;
use crate::types::{Repository, RepositorySettings, Storage};
use crate::validation::validate_name;
use arc_swap::ArcSwap;
use bytes::Bytes;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const REGISTRY_FILE: &str = "storages.json";
const STORAGES_DIR: &str = "storages";
const STAGING_DIR: &str = ".staging";

/// Default bound on waiting for a commit lock.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of walking a catch-all path.
#[derive(Debug, Clone)]
pub enum Resolved {
    Directory(Vec<ChildEntry>),
    Leaf(Arc<Leaf>),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    next_id: i64,
    storages: Vec<Storage>,
}

/// A storage and its open repositories.
#[derive(Debug, Clone)]
pub struct StorageEntry {
    pub storage: Storage,
    trees: IndexMap<String, Arc<RepositoryTree>>,
}

impl StorageEntry {
    pub fn tree(&self, repository: &str) -> Option<&Arc<RepositoryTree>> {
        self.trees.get(repository)
    }
}

pub struct NamespaceIndex {
    data_dir: PathBuf,
    staging_root: PathBuf,
    commit_timeout: Duration,
    storages: ArcSwap<IndexMap<String, Arc<StorageEntry>>>,
    next_id: std::sync::atomic::AtomicI64,
    admin_lock: Mutex<()>,
}

impl std::fmt::Debug for NamespaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceIndex")
            .field("data_dir", &self.data_dir)
            .field("storages", &self.storages.load().len())
            .finish()
    }
}

impl NamespaceIndex {
    /// Open the data directory, clearing stale staging entries and rebuilding
    /// every repository tree from disk.
    pub fn open(data_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let data_dir = data_dir.into();
        let staging_root = data_dir.join(STAGING_DIR);
        std::fs::create_dir_all(data_dir.join(STORAGES_DIR))?;
        storage::clear_stale_staging(&staging_root)?;

        let registry: RegistryFile =
            storage::load_json(data_dir.join(REGISTRY_FILE))?.unwrap_or_default();

        let mut storages = IndexMap::new();
        let mut max_id = 0;
        for storage in registry.storages {
            max_id = max_id.max(storage.id);
            let mut trees = IndexMap::new();
            for repository in &storage.repositories {
                let root_dir = repository_dir(&data_dir, &storage.name, &repository.name);
                let tree = RepositoryTree::open(
                    &storage.name,
                    repository.clone(),
                    root_dir,
                    staging_root.clone(),
                )?;
                trees.insert(repository.name.clone(), Arc::new(tree));
            }
            storages.insert(
                storage.name.clone(),
                Arc::new(StorageEntry { storage, trees }),
            );
        }

        info!(
            data_dir = %data_dir.display(),
            storages = storages.len(),
            "Opened namespace index"
        );

        Ok(NamespaceIndex {
            data_dir,
            staging_root,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            storages: ArcSwap::from_pointee(storages),
            next_id: std::sync::atomic::AtomicI64::new(registry.next_id.max(max_id + 1)),
            admin_lock: Mutex::new(()),
        })
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn commit_timeout(&self) -> Duration {
        self.commit_timeout
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root for private staging directories of in-flight uploads.
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    // ---- registry reads ----

    pub fn storages(&self) -> Vec<Storage> {
        self.storages
            .load()
            .values()
            .map(|entry| entry.storage.clone())
            .collect()
    }

    pub fn storage_by_id(&self, id: i64) -> Option<Storage> {
        self.storages
            .load()
            .values()
            .find(|entry| entry.storage.id == id)
            .map(|entry| entry.storage.clone())
    }

    pub fn storage_by_name(&self, name: &str) -> Option<Storage> {
        self.storages
            .load()
            .get(name)
            .map(|entry| entry.storage.clone())
    }

    /// Open tree of `storage/repository`, or `NotFound`.
    pub fn repository(&self, storage: &str, repository: &str) -> AppResult<Arc<RepositoryTree>> {
        let storages = self.storages.load();
        let entry = storages
            .get(storage)
            .ok_or_else(|| AppError::NotFound(format!("Storage '{storage}' not found")))?;
        entry.tree(repository).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "Repository '{repository}' not found in storage '{storage}'"
            ))
        })
    }

    // ---- tree reads ----

    pub fn exists(&self, storage: &str, repository: &str, path: &RelativePath) -> bool {
        self.repository(storage, repository)
            .and_then(|tree| tree.lookup(path))
            .is_ok()
    }

    /// Child names of a directory in lexicographic order.
    pub fn list_children(
        &self,
        storage: &str,
        repository: &str,
        path: &RelativePath,
    ) -> AppResult<Vec<String>> {
        let node = self.repository(storage, repository)?.lookup(path)?;
        Ok(node.children().into_iter().map(|child| child.name).collect())
    }

    /// Walk `path` segment by segment: a directory yields its listing, a leaf
    /// yields itself, a leaf in the middle of the path is `PathTooDeep`.
    pub fn resolve_segments(
        &self,
        storage: &str,
        repository: &str,
        path: &RelativePath,
    ) -> AppResult<Resolved> {
        let node = self.repository(storage, repository)?.lookup(path)?;
        Ok(match node.as_ref() {
            Node::Directory(_) => Resolved::Directory(node.children()),
            Node::Leaf(leaf) => Resolved::Leaf(Arc::clone(leaf)),
        })
    }

    // ---- tree writes ----

    /// Open a commit on `storage/repository`.
    pub async fn begin_commit(&self, storage: &str, repository: &str) -> AppResult<CommitSession> {
        self.repository(storage, repository)?
            .begin_commit(self.commit_timeout)
            .await
    }

    /// Publish already staged files in one atomic step.
    pub async fn commit(
        &self,
        storage: &str,
        repository: &str,
        files: Vec<StagedFile>,
    ) -> AppResult<CommitOutcome> {
        let mut session = self.begin_commit(storage, repository).await?;
        for file in files {
            session.add(file)?;
        }
        session.publish().await
    }

    /// Store a single file, replacing any leaf already at `path`.
    pub async fn insert(
        &self,
        storage: &str,
        repository: &str,
        path: &RelativePath,
        content: Bytes,
    ) -> AppResult<()> {
        // Fail before staging when the repository does not exist.
        self.repository(storage, repository)?;

        let staging = tempfile::Builder::new()
            .prefix("insert-")
            .tempdir_in(&self.staging_root)?;
        let staged_at = staging.path().join("content");
        tokio::fs::write(&staged_at, &content).await?;
        let leaf = Leaf::new(&content);

        self.commit(
            storage,
            repository,
            vec![StagedFile {
                path: path.clone(),
                staged_at,
                leaf: Arc::new(leaf),
                expect_absent: false,
            }],
        )
        .await?;
        Ok(())
    }

    pub async fn remove(&self, storage: &str, repository: &str, path: &RelativePath) -> AppResult<()> {
        self.repository(storage, repository)?
            .remove(path, self.commit_timeout)
            .await
    }

    // ---- registry writes ----

    pub async fn create_storage(&self, name: &str) -> AppResult<Storage> {
        let name = validate_name(name)?;
        let _admin = self.admin_lock.lock().await;

        let current = self.storages.load_full();
        if current.contains_key(&name) {
            return Err(AppError::PathConflict {
                path: name,
                existing: "storage",
            });
        }

        let storage = Storage {
            id: self
                .next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            name: name.clone(),
            created: Utc::now(),
            repositories: Vec::new(),
        };
        tokio::fs::create_dir_all(self.data_dir.join(STORAGES_DIR).join(&name)).await?;

        let mut next = current.as_ref().clone();
        next.insert(
            name.clone(),
            Arc::new(StorageEntry {
                storage: storage.clone(),
                trees: IndexMap::new(),
            }),
        );
        self.persist(&next).await?;
        self.storages.store(Arc::new(next));

        info!(storage = %name, id = storage.id, "Created storage");
        Ok(storage)
    }

    /// Delete a storage and, with it, every repository and file it holds.
    pub async fn delete_storage(&self, id: i64) -> AppResult<Storage> {
        let _admin = self.admin_lock.lock().await;

        let current = self.storages.load_full();
        let entry = current
            .values()
            .find(|entry| entry.storage.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Storage {id} not found")))?;

        let mut guards = Vec::with_capacity(entry.trees.len());
        for tree in entry.trees.values() {
            guards.push(tree.lock(self.commit_timeout).await?);
        }

        let mut next = current.as_ref().clone();
        next.shift_remove(&entry.storage.name);
        self.persist(&next).await?;
        self.storages.store(Arc::new(next));
        // Retire only once the registry no longer lists the trees.
        for (tree, guard) in entry.trees.values().zip(&guards) {
            tree.retire(guard);
        }

        storage::remove_dir_if_exists(self.data_dir.join(STORAGES_DIR).join(&entry.storage.name))
            .await?;
        drop(guards);

        info!(
            storage = %entry.storage.name,
            id,
            repositories = entry.trees.len(),
            "Deleted storage"
        );
        Ok(entry.storage.clone())
    }

    pub async fn create_repository(
        &self,
        storage_id: i64,
        repository: Repository,
    ) -> AppResult<Repository> {
        validate_name(&repository.name)?;
        let _admin = self.admin_lock.lock().await;

        let current = self.storages.load_full();
        let entry = self.entry_by_id(&current, storage_id)?;
        if entry.trees.contains_key(&repository.name) {
            return Err(AppError::PathConflict {
                path: format!("{}/{}", entry.storage.name, repository.name),
                existing: "repository",
            });
        }

        let root_dir = repository_dir(&self.data_dir, &entry.storage.name, &repository.name);
        let tree = RepositoryTree::open(
            &entry.storage.name,
            repository.clone(),
            root_dir,
            self.staging_root.clone(),
        )?;

        let mut updated = entry.as_ref().clone();
        updated.storage.repositories.push(repository.clone());
        updated
            .trees
            .insert(repository.name.clone(), Arc::new(tree));

        let mut next = current.as_ref().clone();
        next.insert(updated.storage.name.clone(), Arc::new(updated));
        self.persist(&next).await?;
        self.storages.store(Arc::new(next));

        info!(
            storage = %entry.storage.name,
            repository = %repository.name,
            policy = %repository.policy,
            "Created repository"
        );
        Ok(repository)
    }

    /// Change the settings of an existing repository.
    pub async fn update_repository(
        &self,
        storage_id: i64,
        name: &str,
        settings: &RepositorySettings,
    ) -> AppResult<Repository> {
        let _admin = self.admin_lock.lock().await;

        let current = self.storages.load_full();
        let entry = self.entry_by_id(&current, storage_id)?;
        let tree = entry.tree(name).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "Repository '{name}' not found in storage '{}'",
                entry.storage.name
            ))
        })?;

        let guard = tree.lock(self.commit_timeout).await?;
        let repository = settings.apply_to(&tree.config());

        let mut updated = entry.as_ref().clone();
        for existing in updated.storage.repositories.iter_mut() {
            if existing.name == name {
                *existing = repository.clone();
            }
        }

        let mut next = current.as_ref().clone();
        next.insert(updated.storage.name.clone(), Arc::new(updated));
        self.persist(&next).await?;
        self.storages.store(Arc::new(next));
        tree.replace_config(&guard, repository.clone());

        info!(
            storage = %entry.storage.name,
            repository = %name,
            visibility = ?repository.visibility,
            active = repository.active,
            policy = %repository.policy,
            "Updated repository settings"
        );
        Ok(repository)
    }

    pub async fn delete_repository(&self, storage_id: i64, name: &str) -> AppResult<Repository> {
        let _admin = self.admin_lock.lock().await;

        let current = self.storages.load_full();
        let entry = self.entry_by_id(&current, storage_id)?;
        let tree = entry.tree(name).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "Repository '{name}' not found in storage '{}'",
                entry.storage.name
            ))
        })?;

        let guard = tree.lock(self.commit_timeout).await?;

        let mut updated = entry.as_ref().clone();
        updated.storage.repositories.retain(|r| r.name != name);
        updated.trees.shift_remove(name);

        let mut next = current.as_ref().clone();
        next.insert(updated.storage.name.clone(), Arc::new(updated));
        self.persist(&next).await?;
        self.storages.store(Arc::new(next));
        tree.retire(&guard);

        storage::remove_dir_if_exists(tree.root_dir()).await?;
        drop(guard);

        info!(storage = %entry.storage.name, repository = %name, "Deleted repository");
        Ok(tree.config().as_ref().clone())
    }

    fn entry_by_id(
        &self,
        storages: &IndexMap<String, Arc<StorageEntry>>,
        id: i64,
    ) -> AppResult<Arc<StorageEntry>> {
        storages
            .values()
            .find(|entry| entry.storage.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Storage {id} not found")))
    }

    async fn persist(&self, storages: &IndexMap<String, Arc<StorageEntry>>) -> AppResult<()> {
        let registry = RegistryFile {
            next_id: self.next_id.load(std::sync::atomic::Ordering::SeqCst),
            storages: storages.values().map(|e| e.storage.clone()).collect(),
        };
        storage::save_json_atomic(self.data_dir.join(REGISTRY_FILE), &registry)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to persist storage registry"))
    }
}

fn repository_dir(data_dir: &Path, storage: &str, repository: &str) -> PathBuf {
    data_dir.join(STORAGES_DIR).join(storage).join(repository)
}
