//! Common test utilities and helpers
//!
//! Shared setup for the integration tests: a bootstrapped server state over a
//! temporary data directory, an in-process `TestServer`, and upload forms.

#![allow(dead_code)]

use anyhow::Result;
use artifact_server::{build_router, AppState, Config};
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub app_state: Arc<AppState>,
    pub server: TestServer,
}

/// Configuration pointing at `temp_dir`, with the default `local` storage
/// (`releases` and `snapshots`) and authentication off.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = temp_dir.path().to_path_buf();
    config.limits.staging_timeout_secs = 5;
    config
}

/// Creates a bootstrapped state and an in-process server over it
pub async fn create_test_setup() -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    create_test_setup_with(test_config(&temp_dir), temp_dir).await
}

pub async fn create_test_setup_with(config: Config, temp_dir: TempDir) -> Result<TestSetup> {
    let state = AppState::new(config)?;
    state.bootstrap().await?;
    let app_state = Arc::new(state);
    let server = TestServer::new(build_router(Arc::clone(&app_state)))?;

    Ok(TestSetup {
        temp_dir,
        app_state,
        server,
    })
}

/// Multipart form naming the artifact by coordinate string
pub fn upload_form(coordinate: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text("coordinate", coordinate.to_string())
        .add_part("file", file_part(content))
}

pub fn file_part(content: &[u8]) -> Part {
    Part::bytes(content.to_vec())
        .file_name("artifact.bin")
        .mime_type("application/octet-stream")
}

/// Binds an ephemeral port and serves `app` on it in the background
pub async fn serve_on_ephemeral_port(app: axum::Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(format!("http://{addr}"))
}
