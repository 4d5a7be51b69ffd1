//! Data model shared by the index, the HTTP API and the client.
//!
//! These are the wire shapes as well: a [`Storage`] serializes to exactly what
//! `GET /api/storages/id/{id}` returns inside its `{success, data}` envelope.

use crate::coordinate::RepositoryLayout;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which version kinds a repository accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    #[default]
    Release,
    Snapshot,
    Mixed,
}

impl VersionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionPolicy::Release => "release",
            VersionPolicy::Snapshot => "snapshot",
            VersionPolicy::Mixed => "mixed",
        }
    }

    pub fn allows_snapshots(&self) -> bool {
        matches!(self, VersionPolicy::Snapshot | VersionPolicy::Mixed)
    }

    pub fn allows_releases(&self) -> bool {
        matches!(self, VersionPolicy::Release | VersionPolicy::Mixed)
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(VersionPolicy::Release),
            "snapshot" => Ok(VersionPolicy::Snapshot),
            "mixed" => Ok(VersionPolicy::Mixed),
            other => Err(AppError::BadRequest(format!(
                "Unknown version policy '{other}' (expected release, snapshot or mixed)"
            ))),
        }
    }
}

/// Whether the upload pipeline generates a descriptor when none is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorPolicy {
    #[default]
    Generate,
    None,
}

impl FromStr for DescriptorPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generate" => Ok(DescriptorPolicy::Generate),
            "none" => Ok(DescriptorPolicy::None),
            other => Err(AppError::BadRequest(format!(
                "Unknown descriptor policy '{other}' (expected generate or none)"
            ))),
        }
    }
}

/// Who may read a repository.
///
/// Private repositories need an API key for reads when authentication is on.
/// Hidden repositories are readable by path but left out of listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Hidden,
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "hidden" => Ok(Visibility::Hidden),
            other => Err(AppError::BadRequest(format!(
                "Unknown visibility '{other}' (expected public, private or hidden)"
            ))),
        }
    }
}

fn default_active() -> bool {
    true
}

/// A named container of artifacts inside a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub layout: RepositoryLayout,
    #[serde(default)]
    pub policy: VersionPolicy,
    #[serde(default)]
    pub descriptor: DescriptorPolicy,
    #[serde(default)]
    pub visibility: Visibility,
    /// Inactive repositories refuse reads and writes of their content.
    #[serde(default = "default_active")]
    pub active: bool,
    pub created: DateTime<Utc>,
}

impl Repository {
    pub fn new(name: impl Into<String>, policy: VersionPolicy) -> Self {
        Repository {
            name: name.into(),
            layout: RepositoryLayout::default(),
            policy,
            descriptor: DescriptorPolicy::default(),
            visibility: Visibility::default(),
            active: true,
            created: Utc::now(),
        }
    }
}

/// Partial update of a repository's settings; absent fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<VersionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorPolicy>,
}

impl RepositorySettings {
    pub fn is_empty(&self) -> bool {
        *self == RepositorySettings::default()
    }

    pub fn apply_to(&self, repository: &Repository) -> Repository {
        Repository {
            visibility: self.visibility.unwrap_or(repository.visibility),
            active: self.active.unwrap_or(repository.active),
            policy: self.policy.unwrap_or(repository.policy),
            descriptor: self.descriptor.unwrap_or(repository.descriptor),
            ..repository.clone()
        }
    }
}

/// Top-level grouping of repositories.
///
/// `Storage::default()` is the sentinel the client returns when the server
/// cannot be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Storage {
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }
}

/// Payload of `GET /api/storages/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageList {
    pub storages: Vec<Storage>,
}

impl StorageList {
    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }
}

/// `{success, data}` envelope used by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data,
        }
    }
}
