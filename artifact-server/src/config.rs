//! # Configuration Management
//!
//! Server configuration is a JSON document with five sections:
//!
//! - [`ServerConfig`]: bind host, port and URL scheme
//! - [`StorageConfig`]: the data directory holding the registry and artifacts
//! - [`LimitsConfig`]: upload size, request body size and staging timeout
//! - [`SecurityConfig`]: optional API key authentication
//! - [`BootstrapConfig`]: storages and repositories created on first start
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! # use artifact_server::config::Config;
//! // Load from file with fallback to defaults
//! let config = Config::load_or_default("config.json")?;
//!
//! // Load from file (fails if file doesn't exist)
//! let config = Config::load("config.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Command line flags override the loaded values (see `main.rs`).

use crate::error::AppResult;
use crate::types::{DescriptorPolicy, VersionPolicy};
use crate::validation::{MAX_REQUEST_BODY_SIZE, MAX_UPLOAD_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    /// Upload and request limits (defaults applied if not specified)
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Security and authentication settings (defaults applied if not specified)
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host/IP address to bind to (e.g., "0.0.0.0" or "localhost")
    pub host: String,
    pub port: u16,
    /// URL scheme ("http" or "https")
    pub scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds `storages.json`, `storages/` and `.staging/`
    pub data_dir: PathBuf,
}

/// Upload and request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_size_mb: u64,
    pub max_request_body_size_mb: usize,
    /// Bound on staging an upload and on waiting for a commit lock
    pub staging_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: MAX_UPLOAD_SIZE / BYTES_PER_MB,
            max_request_body_size_mb: MAX_REQUEST_BODY_SIZE / BYTES_PER_MB as usize,
            staging_timeout_secs: 30,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    pub require_authentication: bool,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    pub storages: Vec<BootstrapStorage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapStorage {
    pub name: String,
    #[serde(default)]
    pub repositories: Vec<BootstrapRepository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRepository {
    pub name: String,
    #[serde(default)]
    pub policy: VersionPolicy,
    #[serde(default)]
    pub descriptor: DescriptorPolicy,
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not match the configuration
    /// format.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults when the file
    /// does not exist. A file that exists but does not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.limits.max_upload_size_mb * BYTES_PER_MB
    }

    pub fn max_request_body_size_bytes(&self) -> usize {
        self.limits.max_request_body_size_mb * BYTES_PER_MB as usize
    }

    pub fn staging_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.staging_timeout_secs.max(1))
    }

    /// Externally visible base URL.
    pub fn server_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.server.scheme, self.server.host, self.server.port
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str(include_str!("../config.json"))
            .expect("Failed to parse embedded config.json")
    }
}
