//! HTTP client for a remote artifact server.
//!
//! The listing calls never surface transport errors: a refused connection, a
//! non-success status, an unparsable body or `success: false` all yield the
//! same empty value as a server with nothing to list.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{ApiResponse, Storage, StorageList};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// API client for the storage endpoints of an artifact server
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RepositoryClient {
    pub fn new(base_url: &str) -> Self {
        // Check for auth token from environment variable
        let auth_token = std::env::var("ARTIFACT_SERVER_TOKEN").ok();
        if auth_token.is_some() {
            debug!("Using authentication token from ARTIFACT_SERVER_TOKEN environment variable");
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/storages/list`, or an empty list.
    pub async fn get_storages(&self) -> StorageList {
        self.fetch::<Vec<Storage>>("/api/storages/list")
            .await
            .map(|storages| StorageList { storages })
            .unwrap_or_default()
    }

    /// `GET /api/storages/id/{id}`, or [`Storage::default`].
    pub async fn get_storage(&self, id: i64) -> Storage {
        self.fetch::<Storage>(&format!("/api/storages/id/{id}"))
            .await
            .unwrap_or_default()
    }

    /// `GET /storages.json`, or no names.
    pub async fn get_storages_public(&self) -> Vec<String> {
        self.fetch::<Vec<String>>("/storages.json")
            .await
            .unwrap_or_default()
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> Option<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Server returned an error status");
            return None;
        }

        match response.json::<ApiResponse<T>>().await {
            Ok(body) if body.success => Some(body.data),
            Ok(_) => {
                warn!(url = %url, "Server reported failure");
                None
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Unparsable response body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = RepositoryClient::new("http://localhost:8480/");
        assert_eq!(client.base_url(), "http://localhost:8480");
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_sentinels() {
        // Port 9 (discard) on localhost is not served in test environments.
        let client = RepositoryClient::new("http://127.0.0.1:9");
        assert!(client.get_storages().await.is_empty());
        assert_eq!(client.get_storage(1).await, Storage::default());
        assert!(client.get_storages_public().await.is_empty());
    }
}
