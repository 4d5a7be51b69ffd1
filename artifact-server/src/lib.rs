//! # Artifact Repository Server
//!
//! Hosts build artifacts in a Storage → Repository → path hierarchy laid out
//! the Maven 2 way. Artifacts are addressed by coordinate
//! (`group:artifactId[:extension[:classifier]]:version`) or by layout path, and
//! published through a staged upload pipeline that enforces repository
//! policy, release immutability and checksums.
//!
//! ```
//! # use artifact_server::Coordinate;
//! let c = Coordinate::parse("org.example:lib:jar:sources:1.0.0")?;
//! assert_eq!(c.extension, "jar");
//! assert_eq!(c.classifier.as_deref(), Some("sources"));
//! assert_eq!(c.version, "1.0.0");
//! # Ok::<(), artifact_server::AppError>(())
//! ```
//!
//! ## Key Modules
//!
//! - [`coordinate`]: coordinate parsing and the coordinate ↔ path mapping
//! - [`namespace`]: the persisted, copy-on-write path tree of every repository
//! - [`resolver`]: read and write resolution against repository policy
//! - [`upload`]: the Received → Validated → Staged → Committed pipeline
//! - [`descriptor`] and [`metadata`]: POM and `maven-metadata.xml` handling
//! - [`browse`]: listings of storages, repositories and directories
//! - [`versions`]: version lists and project summaries of one artifact
//! - [`api`] and [`server`]: the HTTP surface
//! - [`client`]: a client for the storage endpoints of a remote server
//! - [`config`], [`error`], [`validation`]: ambient plumbing

// Module declarations
pub mod api;
pub mod auth;
pub mod browse;
pub mod client;
pub mod config;
pub mod coordinate;
pub mod descriptor;
pub mod error;
pub mod hash_utils;
pub mod metadata;
pub mod namespace;
pub mod path;
pub mod resolver;
pub mod server;
pub mod state;
pub mod storage;
pub mod types;
pub mod upload;
pub mod validation;
pub mod version;
pub mod versions;

// Re-export key types for convenience
pub use client::RepositoryClient;
pub use config::Config;
pub use coordinate::{Coordinate, RepositoryLayout};
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use path::RelativePath;
pub use server::{build_router, run_server, run_server_with_shutdown};
pub use state::AppState;
pub use validation::{ValidationError, ValidationResult};
