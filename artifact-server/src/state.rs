//! # Application State Management
//!
//! [`AppState`] is created once at startup and cloned into every request
//! handler. All of its members are cheap handles over the same
//! [`NamespaceIndex`].
//!
//! ```rust,no_run
//! use artifact_server::{config::Config, state::AppState};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(Config::default())?;
//! state.bootstrap().await?;
//! # Ok(())
//! # }
//! ```

use crate::browse::BrowseService;
use crate::config::Config;
use crate::error::AppResult;
use crate::namespace::NamespaceIndex;
use crate::resolver::RepositoryResolver;
use crate::types::Repository;
use crate::upload::{UploadLimits, UploadPipeline};
use crate::versions::VersionQueries;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<NamespaceIndex>,
    pub resolver: RepositoryResolver,
    pub uploads: UploadPipeline,
    pub browse: BrowseService,
    pub versions: VersionQueries,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Open the data directory named by `config` and wire up the services.
    pub fn new(config: Config) -> AppResult<Self> {
        let index = Arc::new(
            NamespaceIndex::open(&config.storage.data_dir)?
                .with_commit_timeout(config.staging_timeout()),
        );
        let resolver = RepositoryResolver::new(Arc::clone(&index));
        let uploads = UploadPipeline::new(
            resolver.clone(),
            UploadLimits {
                max_upload_size: config.max_upload_size_bytes(),
                staging_timeout: config.staging_timeout(),
            },
        );
        let browse = BrowseService::new(resolver.clone());
        let versions = VersionQueries::new(resolver.clone());

        Ok(AppState {
            config: Arc::new(config),
            index,
            resolver,
            uploads,
            browse,
            versions,
            started_at: Utc::now(),
        })
    }

    /// Create the configured bootstrap storages and repositories that do not
    /// exist yet. Existing ones are left untouched.
    pub async fn bootstrap(&self) -> AppResult<()> {
        for wanted in &self.config.bootstrap.storages {
            let storage = match self.index.storage_by_name(&wanted.name) {
                Some(storage) => storage,
                None => self.index.create_storage(&wanted.name).await?,
            };

            for repo in &wanted.repositories {
                if storage.repository(&repo.name).is_some() {
                    continue;
                }
                let mut repository = Repository::new(&repo.name, repo.policy);
                repository.descriptor = repo.descriptor;
                self.index.create_repository(storage.id, repository).await?;
                info!(storage = %storage.name, repository = %repo.name, "Bootstrapped repository");
            }
        }
        Ok(())
    }
}
