//! Immutable path tree of one repository.
//!
//! Nodes are never mutated in place. [`with_leaf`] and [`without`] return a new
//! root that shares every untouched subtree with the old one, so a reader
//! holding the old root keeps a consistent view.

use crate::error::{AppError, AppResult};
use crate::hash_utils::{digest_file, sha1_hash, sha256_hash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Size and checksums of one stored file. The bytes stay on disk under the
/// repository directory and are streamed from there on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub size: u64,
    pub sha1: String,
    pub sha256: String,
    pub modified: DateTime<Utc>,
}

impl Leaf {
    pub fn new(content: &[u8]) -> Self {
        Self::with_modified(content, Utc::now())
    }

    pub fn with_modified(content: &[u8], modified: DateTime<Utc>) -> Self {
        Leaf {
            size: content.len() as u64,
            sha1: sha1_hash(content),
            sha256: sha256_hash(content),
            modified,
        }
    }

    /// Describe a file already on disk, hashing it in fixed-size chunks.
    pub fn from_file(path: &Path, modified: DateTime<Utc>) -> std::io::Result<Self> {
        let digests = digest_file(path)?;
        Ok(Leaf {
            size: digests.size,
            sha1: digests.sha1,
            sha256: digests.sha256,
            modified,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub children: BTreeMap<String, Arc<Node>>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Directory(Directory),
    Leaf(Arc<Leaf>),
}

impl Default for Node {
    fn default() -> Self {
        Node::Directory(Directory::default())
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildEntry {
    pub name: String,
    pub directory: bool,
    pub size: Option<u64>,
    pub modified: DateTime<Utc>,
}

impl Node {
    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_leaf(&self) -> Option<&Arc<Leaf>> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Directory(_) => None,
        }
    }

    pub fn modified(&self) -> DateTime<Utc> {
        match self {
            Node::Directory(dir) => dir.modified,
            Node::Leaf(leaf) => leaf.modified,
        }
    }

    /// Children in lexicographic order. Leaves have none.
    pub fn children(&self) -> Vec<ChildEntry> {
        let Node::Directory(dir) = self else {
            return Vec::new();
        };
        dir.children
            .iter()
            .map(|(name, child)| ChildEntry {
                name: name.clone(),
                directory: child.is_directory(),
                size: child.as_leaf().map(|leaf| leaf.size),
                modified: child.modified(),
            })
            .collect()
    }

    /// Names of child directories.
    pub fn child_directories(&self) -> Vec<String> {
        match self {
            Node::Directory(dir) => dir
                .children
                .iter()
                .filter(|(_, child)| child.is_directory())
                .map(|(name, _)| name.clone())
                .collect(),
            Node::Leaf(_) => Vec::new(),
        }
    }
}

/// Walk `segments` from `root` one segment at a time.
pub fn lookup(root: &Arc<Node>, segments: &[String]) -> AppResult<Arc<Node>> {
    let mut current = Arc::clone(root);
    for (depth, segment) in segments.iter().enumerate() {
        let next = match current.as_ref() {
            Node::Leaf(_) => {
                return Err(AppError::PathTooDeep {
                    path: segments.join("/"),
                    leaf: segments[..depth].join("/"),
                })
            }
            Node::Directory(dir) => match dir.children.get(segment) {
                Some(child) => Arc::clone(child),
                None => {
                    return Err(AppError::NotFound(format!(
                        "Path '{}' not found",
                        segments.join("/")
                    )))
                }
            },
        };
        current = next;
    }
    Ok(current)
}

/// Return a new root with `leaf` stored at `segments`, creating directories on
/// the way. Fails with `PathConflict` when a leaf would shadow a directory or
/// a directory would have to pass through a leaf.
pub fn with_leaf(root: &Node, segments: &[String], leaf: Arc<Leaf>) -> AppResult<Node> {
    insert_at(root, segments, 0, leaf)
}

fn insert_at(node: &Node, segments: &[String], depth: usize, leaf: Arc<Leaf>) -> AppResult<Node> {
    let conflict = |end: usize, existing: &'static str| AppError::PathConflict {
        path: segments[..end].join("/"),
        existing,
    };

    let Node::Directory(dir) = node else {
        return Err(conflict(depth, "artifact"));
    };
    let Some(segment) = segments.get(depth) else {
        return Err(conflict(depth, "directory"));
    };

    let modified = leaf.modified;
    let child = if depth + 1 == segments.len() {
        if let Some(existing) = dir.children.get(segment) {
            if existing.is_directory() {
                return Err(conflict(depth + 1, "directory"));
            }
        }
        Node::Leaf(leaf)
    } else {
        match dir.children.get(segment) {
            Some(existing) => insert_at(existing, segments, depth + 1, leaf)?,
            None => insert_at(&Node::default(), segments, depth + 1, leaf)?,
        }
    };

    let mut children = dir.children.clone();
    children.insert(segment.clone(), Arc::new(child));
    Ok(Node::Directory(Directory {
        children,
        modified: dir.modified.max(modified),
    }))
}

/// Return a new root without the node at `segments`. Directories left empty by
/// the removal are pruned; the root itself always survives.
pub fn without(root: &Node, segments: &[String]) -> AppResult<Node> {
    match remove_at(root, segments, 0)? {
        Some(node) => Ok(node),
        None => Ok(Node::default()),
    }
}

fn remove_at(node: &Node, segments: &[String], depth: usize) -> AppResult<Option<Node>> {
    let not_found = || AppError::NotFound(format!("Path '{}' not found", segments.join("/")));

    let Node::Directory(dir) = node else {
        return Err(not_found());
    };
    let segment = segments.get(depth).ok_or_else(not_found)?;
    let child = dir.children.get(segment).ok_or_else(not_found)?;

    let mut children = dir.children.clone();
    if depth + 1 == segments.len() {
        children.remove(segment);
    } else {
        match remove_at(child, segments, depth + 1)? {
            Some(replacement) => {
                children.insert(segment.clone(), Arc::new(replacement));
            }
            None => {
                children.remove(segment);
            }
        }
    }

    if children.is_empty() && depth > 0 {
        return Ok(None);
    }
    Ok(Some(Node::Directory(Directory {
        children,
        modified: Utc::now(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    fn leaf(content: &'static [u8]) -> Arc<Leaf> {
        Arc::new(Leaf::new(content))
    }

    #[test]
    fn test_insert_and_lookup() {
        let root = with_leaf(&Node::default(), &segs("org/example/lib.jar"), leaf(b"abc")).unwrap();
        let root = Arc::new(root);

        let found = lookup(&root, &segs("org/example/lib.jar")).unwrap();
        assert_eq!(found.as_leaf().unwrap().size, 3);

        let dir = lookup(&root, &segs("org")).unwrap();
        let children = dir.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "example");
        assert!(children[0].directory);
    }

    #[test]
    fn test_old_root_is_unchanged() {
        let first = Arc::new(with_leaf(&Node::default(), &segs("a/b"), leaf(b"1")).unwrap());
        let second = Arc::new(with_leaf(&first, &segs("a/c"), leaf(b"2")).unwrap());

        assert!(lookup(&first, &segs("a/c")).is_err());
        assert!(lookup(&second, &segs("a/c")).is_ok());
        assert!(lookup(&second, &segs("a/b")).is_ok());
    }

    #[test]
    fn test_leaf_and_directory_never_share_a_path() {
        let root = with_leaf(&Node::default(), &segs("a/b"), leaf(b"1")).unwrap();
        assert!(matches!(
            with_leaf(&root, &segs("a/b/c"), leaf(b"2")),
            Err(AppError::PathConflict { existing: "artifact", .. })
        ));
        assert!(matches!(
            with_leaf(&root, &segs("a"), leaf(b"2")),
            Err(AppError::PathConflict { existing: "directory", .. })
        ));
    }

    #[test]
    fn test_lookup_below_leaf_is_too_deep() {
        let root = Arc::new(with_leaf(&Node::default(), &segs("a/b"), leaf(b"1")).unwrap());
        match lookup(&root, &segs("a/b/c/d")) {
            Err(AppError::PathTooDeep { leaf, .. }) => assert_eq!(leaf, "a/b"),
            other => panic!("expected PathTooDeep, got {other:?}"),
        }
        assert!(matches!(
            lookup(&root, &segs("a/x")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_prunes_empty_directories() {
        let root = with_leaf(&Node::default(), &segs("a/b/c"), leaf(b"1")).unwrap();
        let root = with_leaf(&root, &segs("x"), leaf(b"2")).unwrap();
        let root = Arc::new(without(&root, &segs("a/b/c")).unwrap());

        assert!(lookup(&root, &segs("a")).is_err());
        assert_eq!(root.children().len(), 1);
        assert!(matches!(
            without(&root, &segs("a/b/c")),
            Err(AppError::NotFound(_))
        ));
    }
}
