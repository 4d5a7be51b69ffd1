//! Repository client tests against real servers on ephemeral ports

mod common;

use artifact_server::{build_router, types::Storage, AppState, RepositoryClient};
use axum::{http::StatusCode, routing::get, Json, Router};
use common::{serve_on_ephemeral_port, test_config};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_client_reads_storages() {
    let temp_dir = TempDir::new().unwrap();
    let state = AppState::new(test_config(&temp_dir)).unwrap();
    state.bootstrap().await.unwrap();
    let base_url = serve_on_ephemeral_port(build_router(Arc::new(state)))
        .await
        .unwrap();

    let client = RepositoryClient::new(&base_url);
    let storages = client.get_storages().await;
    assert_eq!(storages.storages.len(), 1);
    assert_eq!(storages.storages[0].name, "local");

    let storage = client.get_storage(storages.storages[0].id).await;
    assert_eq!(storage.repositories.len(), 2);

    assert_eq!(client.get_storages_public().await, vec!["local".to_string()]);

    // Unknown id falls back to the sentinel.
    assert_eq!(client.get_storage(999).await, Storage::default());
}

#[tokio::test]
async fn test_unavailable_server_yields_empty_values() {
    let app = Router::new().fallback(|| async { StatusCode::SERVICE_UNAVAILABLE });
    let base_url = serve_on_ephemeral_port(app).await.unwrap();

    let client = RepositoryClient::new(&base_url);
    assert!(client.get_storages().await.is_empty());
    assert_eq!(client.get_storage(1).await, Storage::default());
    assert!(client.get_storages_public().await.is_empty());
}

#[tokio::test]
async fn test_failure_envelope_and_garbage_yield_empty_values() {
    let app = Router::new()
        .route(
            "/api/storages/list",
            get(|| async { Json(serde_json::json!({ "success": false, "data": [] })) }),
        )
        .route("/storages.json", get(|| async { "not json" }));
    let base_url = serve_on_ephemeral_port(app).await.unwrap();

    let client = RepositoryClient::new(&base_url);
    assert!(client.get_storages().await.is_empty());
    assert!(client.get_storages_public().await.is_empty());
}

#[tokio::test]
async fn test_client_sends_token() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.security.require_authentication = true;
    config.security.api_keys = vec!["deploy-key".to_string()];
    let state = AppState::new(config).unwrap();
    state.bootstrap().await.unwrap();
    let base_url = serve_on_ephemeral_port(build_router(Arc::new(state)))
        .await
        .unwrap();

    let anonymous = RepositoryClient::new(&base_url);
    assert!(anonymous.get_storages().await.is_empty());

    let authorized = RepositoryClient::new(&base_url).with_token("deploy-key");
    assert_eq!(authorized.get_storages().await.storages.len(), 1);
}
