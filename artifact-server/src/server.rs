//! HTTP server setup: routing, middleware and the serve loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{api, auth::auth_middleware, config::Config, state::AppState};

/// Build the application router.
///
/// Reads of repository content, browsing, version queries, `/storages.json`
/// and the service endpoints are public; the handlers still refuse anonymous
/// reads of private repositories. The storage list, every write and the admin
/// endpoints go through [`auth_middleware`].
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/storages/list", get(api::list_storages))
        .route("/api/storages/id/{id}", get(api::get_storage))
        .route("/api/upload/{storage}/{repo}", post(api::upload_artifact))
        .route("/api/admin/storages", post(api::create_storage))
        .route(
            "/api/admin/storages/{id}",
            axum::routing::delete(api::delete_storage),
        )
        .route(
            "/api/admin/storages/{id}/repositories",
            post(api::create_repository),
        )
        .route(
            "/api/admin/storages/{id}/repositories/{name}",
            axum::routing::delete(api::delete_repository),
        )
        .route(
            "/api/admin/storages/{id}/repositories/{name}/settings",
            put(api::update_repository),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    // PUT shares its path with the public GET, so it is guarded per method.
    let deploy = put(api::put_content).route_layer(
        middleware::from_fn_with_state(Arc::clone(&state.config), auth_middleware),
    );

    let public = Router::new()
        .route("/health", get(api::health))
        .route("/status", get(api::status))
        .route("/storages.json", get(api::storage_names))
        .route("/api/browse", get(api::browse_root))
        .route("/api/browse/{storage}", get(api::browse_storage))
        .route("/api/browse/{storage}/{repo}", get(api::browse_repository))
        .route("/api/browse/{storage}/{repo}/{*path}", get(api::browse_path))
        .route("/api/versions/{storage}/{repo}/{*path}", get(api::list_versions))
        .route("/api/version/{storage}/{repo}/{*path}", get(api::get_version))
        .route("/api/project/{storage}/{repo}/{*path}", get(api::get_project))
        .route("/storages/{storage}/{repo}", get(api::get_repository_root))
        .route(
            "/storages/{storage}/{repo}/{*path}",
            get(api::get_content).merge(deploy),
        );

    let body_limit = state.config.max_request_body_size_bytes();
    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.server` and serve until `shutdown` resolves.
pub async fn run_server_with_shutdown<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(config).context("Failed to open the data directory")?;
    state
        .bootstrap()
        .await
        .context("Failed to create bootstrap storages")?;

    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    info!(
        data_dir = %state.index.data_dir().display(),
        storages = state.index.storages().len(),
        "Repository data loaded"
    );

    let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {host}:{port}: {e}")
    })?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let app = build_router(Arc::new(state));
    info!("Artifact server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Artifact server stopped");
    Ok(())
}

/// Run in the foreground until Ctrl+C.
pub async fn run_server(config: Config) -> Result<()> {
    run_server_with_shutdown(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for the shutdown signal");
            return;
        }
        info!("Received shutdown signal, stopping gracefully");
    })
    .await
}
