//! API key authentication middleware and the read check of private
//! repositories
//!
//! When `security.require_authentication` is set, protected routes need either
//! `Authorization: Bearer <key>` or HTTP Basic credentials whose password is an
//! API key (what Maven's `settings.xml` sends on deploy).

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::{
    config::Config,
    error::AppError,
    types::{Repository, Visibility},
};

/// Extract the presented API key from the Authorization header
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    if let Some(token) = value.strip_prefix("Bearer ") {
        return Some(token.trim().to_string());
    }

    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (_user, password) = credentials.split_once(':')?;
    Some(password.to_string())
}

fn is_known_key(config: &Config, presented: &str) -> bool {
    config
        .security
        .api_keys
        .iter()
        .any(|key| bool::from(key.as_bytes().ct_eq(presented.as_bytes())))
}

/// Middleware to validate authentication for protected endpoints
pub async fn auth_middleware(
    State(config): State<Arc<Config>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !config.security.require_authentication {
        return Ok(next.run(req).await);
    }

    if let Err(e) = check_key(&config, req.headers()) {
        tracing::warn!(path = %req.uri().path(), "Rejected unauthenticated request");
        return Err(e);
    }

    Ok(next.run(req).await)
}

fn check_key(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    let key = extract_api_key(headers).ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;
    if !is_known_key(config, &key) {
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }
    Ok(())
}

/// Reads of a private repository's content need a key whenever
/// authentication is on. Public and hidden repositories are open.
pub fn authorize_read(
    config: &Config,
    headers: &HeaderMap,
    repository: &Repository,
) -> Result<(), AppError> {
    if repository.visibility != Visibility::Private || !config.security.require_authentication {
        return Ok(());
    }
    check_key(config, headers)
}

/// Check if authentication is required based on config
pub fn is_auth_required(config: &Config) -> bool {
    config.security.require_authentication && !config.security.api_keys.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionPolicy;

    fn request_with(header_value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, header_value.parse().unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_and_basic() {
        assert_eq!(
            extract_api_key(&request_with("Bearer secret")).as_deref(),
            Some("secret")
        );

        let basic = format!("Basic {}", STANDARD.encode("deployer:secret"));
        assert_eq!(extract_api_key(&request_with(&basic)).as_deref(), Some("secret"));

        assert!(extract_api_key(&request_with("Basic !!!")).is_none());
        assert!(extract_api_key(&request_with("Token secret")).is_none());
    }

    #[test]
    fn test_known_keys() {
        let mut config = Config::default();
        config.security.api_keys = vec!["secret".to_string()];
        assert!(is_known_key(&config, "secret"));
        assert!(!is_known_key(&config, "secre"));
        assert!(!is_known_key(&config, ""));
    }

    #[test]
    fn test_private_reads_need_a_key() {
        let mut config = Config::default();
        config.security.api_keys = vec!["secret".to_string()];
        let mut repository = Repository::new("internal", VersionPolicy::Release);
        repository.visibility = Visibility::Private;
        let anonymous = HeaderMap::new();

        // Authentication off: everything is readable.
        assert!(authorize_read(&config, &anonymous, &repository).is_ok());

        config.security.require_authentication = true;
        assert!(matches!(
            authorize_read(&config, &anonymous, &repository),
            Err(AppError::Unauthorized(_))
        ));
        assert!(authorize_read(&config, &request_with("Bearer wrong"), &repository).is_err());
        assert!(authorize_read(&config, &request_with("Bearer secret"), &repository).is_ok());

        for visibility in [Visibility::Public, Visibility::Hidden] {
            repository.visibility = visibility;
            assert!(authorize_read(&config, &anonymous, &repository).is_ok());
        }
    }

    #[test]
    fn test_is_auth_required() {
        let mut config = Config::default();
        assert!(!is_auth_required(&config));
        config.security.require_authentication = true;
        assert!(!is_auth_required(&config));
        config.security.api_keys.push("k".to_string());
        assert!(is_auth_required(&config));
    }
}
