//! Filesystem helpers for the data directory.

use crate::error::{AppError, AppResult};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Save file content through a sibling temp file and a rename, so readers of
/// `path` only ever see the old or the new content.
pub async fn save_file_atomic<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> AppResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
        debug!(parent = %parent.display(), "Created parent directory");
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::InternalError(format!("Invalid file path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    let content = content.as_ref();
    fs::write(&temp_path, content).await?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    info!(path = %path.display(), size = content.len(), "File saved atomically");
    Ok(())
}

/// Serialize `value` as pretty JSON and save it atomically.
pub async fn save_json_atomic<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> AppResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    save_file_atomic(path, json).await
}

/// Load a JSON document, returning `None` when the file does not exist yet.
pub fn load_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> AppResult<Option<T>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a directory tree, treating an already missing directory as success.
pub async fn remove_dir_if_exists<P: AsRef<Path>>(path: P) -> AppResult<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Removed directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Directory already removed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove empty directories from `start` upwards, stopping at `stop`.
pub async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        // remove_dir only succeeds on empty directories
        if fs::remove_dir(&current).await.is_err() {
            break;
        }
        debug!(path = %current.display(), "Pruned empty directory");
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Delete everything left in the staging directory by an interrupted process.
pub fn clear_stale_staging(staging: &Path) -> AppResult<usize> {
    std::fs::create_dir_all(staging)?;
    let mut removed = 0;
    for entry in std::fs::read_dir(staging)? {
        let path = entry?.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale staging entry"),
        }
    }
    if removed > 0 {
        info!(count = removed, staging = %staging.display(), "Cleared stale staging entries");
    }
    Ok(removed)
}
