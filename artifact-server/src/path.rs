//! Validated relative paths inside a repository tree.

use crate::error::AppResult;
use crate::validation;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// A `/`-separated path relative to a repository root.
///
/// Every segment has passed [`validation::validate_segment`], so joining a
/// `RelativePath` onto a directory can never escape it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// The repository root itself.
    pub fn root() -> Self {
        RelativePath::default()
    }

    /// Parse and validate a `/`-separated path.
    pub fn parse(path: &str) -> AppResult<Self> {
        let segments = validation::validate_safe_path(path)?;
        Ok(RelativePath { segments })
    }

    /// Validate an already split list of segments (catch-all route parameters).
    pub fn from_segments<I, S>(segments: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        validation::validate_segments(&segments)?;
        Ok(RelativePath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<RelativePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(RelativePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one validated segment.
    pub fn join(&self, segment: &str) -> AppResult<RelativePath> {
        validation::validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(RelativePath { segments })
    }

    /// The first `len` segments.
    pub fn prefix(&self, len: usize) -> RelativePath {
        RelativePath {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// Location of this path below `base` on disk.
    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
