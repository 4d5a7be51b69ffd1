//! HTTP handlers for the storage, browse, repository and admin endpoints.
//!
//! Every JSON endpoint answers with the `{success, data}` envelope of
//! [`ApiResponse`]; failures are rendered by [`AppError`]'s `IntoResponse`.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::auth::authorize_read;
use crate::browse::BrowseResult;
use crate::error::{AppError, AppResult};
use crate::namespace::ChildEntry;
use crate::path::RelativePath;
use crate::resolver::{ReadResolution, ReadTarget};
use crate::state::AppState;
use crate::types::{
    ApiResponse, DescriptorPolicy, Repository, RepositorySettings, Storage, VersionPolicy,
};
use crate::upload::{CoordinateInput, DeployOutcome, DescriptorSource, UploadReceipt, UploadRequest};
use crate::validation::MAX_MULTIPART_FIELDS;
use crate::versions::{ProjectInfo, VersionDetail, VersionList};

type ApiJson<T> = Json<ApiResponse<T>>;

/// Unknown repositories are `NotFound`; private ones need a key.
fn check_read(state: &AppState, headers: &HeaderMap, storage: &str, repository: &str) -> AppResult<()> {
    let tree = state.index.repository(storage, repository)?;
    authorize_read(&state.config, headers, &tree.config())
}

// ---- storages ----

/// `GET /api/storages/list`
pub async fn list_storages(State(state): State<Arc<AppState>>) -> ApiJson<Vec<Storage>> {
    Json(ApiResponse::ok(state.browse.list_storages()))
}

/// `GET /api/storages/id/{id}`
pub async fn get_storage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<ApiJson<Storage>> {
    let storage = state
        .index
        .storage_by_id(id)
        .ok_or_else(|| AppError::NotFound(format!("Storage {id} not found")))?;
    Ok(Json(ApiResponse::ok(storage)))
}

/// `GET /storages.json`: public list of storage names.
pub async fn storage_names(State(state): State<Arc<AppState>>) -> ApiJson<Vec<String>> {
    let names = state
        .browse
        .list_storages()
        .into_iter()
        .map(|storage| storage.name)
        .collect();
    Json(ApiResponse::ok(names))
}

// ---- browse ----

pub async fn browse_root(State(state): State<Arc<AppState>>) -> AppResult<ApiJson<BrowseResult>> {
    let result = state.browse.browse(None, None, &RelativePath::root())?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn browse_storage(
    State(state): State<Arc<AppState>>,
    Path(storage): Path<String>,
) -> AppResult<ApiJson<BrowseResult>> {
    let result = state
        .browse
        .browse(Some(&storage), None, &RelativePath::root())?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn browse_repository(
    State(state): State<Arc<AppState>>,
    Path((storage, repository)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<ApiJson<BrowseResult>> {
    check_read(&state, &headers, &storage, &repository)?;
    let result = state
        .browse
        .browse(Some(&storage), Some(&repository), &RelativePath::root())?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn browse_path(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<ApiJson<BrowseResult>> {
    check_read(&state, &headers, &storage, &repository)?;
    let path = RelativePath::parse(&path)?;
    let result = state
        .browse
        .browse(Some(&storage), Some(&repository), &path)?;
    Ok(Json(ApiResponse::ok(result)))
}

// ---- repository content ----

/// `GET /storages/{storage}/{repo}`: listing of the repository root.
pub async fn get_repository_root(
    State(state): State<Arc<AppState>>,
    Path((storage, repository)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    check_read(&state, &headers, &storage, &repository)?;
    read_content(&state, &storage, &repository, RelativePath::root()).await
}

/// `GET /storages/{storage}/{repo}/{*path}`: artifact bytes, or a JSON listing
/// when the path names a directory.
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    check_read(&state, &headers, &storage, &repository)?;
    let path = RelativePath::parse(&path)?;
    read_content(&state, &storage, &repository, path).await
}

/// Artifacts are streamed from disk, never buffered whole.
async fn read_content(
    state: &AppState,
    storage: &str,
    repository: &str,
    path: RelativePath,
) -> AppResult<Response> {
    match state
        .resolver
        .resolve_for_read(storage, repository, ReadTarget::Path(path))?
    {
        ReadResolution::Directory { entries, .. } => {
            Ok(Json(ApiResponse::<Vec<ChildEntry>>::ok(entries)).into_response())
        }
        ReadResolution::Artifact(artifact) => {
            let file = match tokio::fs::File::open(&artifact.location).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %artifact.path, "Indexed artifact is missing on disk");
                    return Err(AppError::NotFound(format!(
                        "Artifact '{}' not found",
                        artifact.path
                    )));
                }
                Err(e) => return Err(e.into()),
            };
            let length = file.metadata().await?.len();
            debug!(storage, repository, path = %artifact.path, size = length, "Serving artifact");
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, artifact.kind.content_type().to_string()),
                    (header::CONTENT_LENGTH, length.to_string()),
                    (header::ETAG, format!("\"{}\"", artifact.leaf.sha1)),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response())
        }
    }
}

// ---- versions ----

/// `GET /api/versions/{storage}/{repo}/{*path}`: versions of the artifact
/// directory `path`.
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<ApiJson<VersionList>> {
    check_read(&state, &headers, &storage, &repository)?;
    let path = RelativePath::parse(&path)?;
    let list = state.versions.versions(&storage, &repository, &path)?;
    Ok(Json(ApiResponse::ok(list)))
}

/// `GET /api/version/{storage}/{repo}/{*path}`: files of one version directory.
pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<ApiJson<VersionDetail>> {
    check_read(&state, &headers, &storage, &repository)?;
    let path = RelativePath::parse(&path)?;
    let detail = state.versions.version(&storage, &repository, &path).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// `GET /api/project/{storage}/{repo}/{*path}`
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<ApiJson<ProjectInfo>> {
    check_read(&state, &headers, &storage, &repository)?;
    let path = RelativePath::parse(&path)?;
    let project = state.versions.project(&storage, &repository, &path).await?;
    Ok(Json(ApiResponse::ok(project)))
}

/// `PUT /storages/{storage}/{repo}/{*path}`: raw deploy of a single file, the
/// way Maven's deploy plugin publishes.
pub async fn put_content(
    State(state): State<Arc<AppState>>,
    Path((storage, repository, path)): Path<(String, String, String)>,
    body: Bytes,
) -> AppResult<(StatusCode, ApiJson<DeployOutcome>)> {
    let path = RelativePath::parse(&path)?;
    info!(storage = %storage, repository = %repository, path = %path, size = body.len(), "Raw deploy");

    let outcome = state
        .uploads
        .deploy_path(&storage, &repository, path, body)
        .await?;
    let status = match outcome {
        DeployOutcome::Stored(_) => StatusCode::CREATED,
        DeployOutcome::Ignored { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(ApiResponse::ok(outcome))))
}

// ---- uploads ----

#[derive(Default)]
struct UploadForm {
    coordinate: Option<String>,
    group: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    classifier: Option<String>,
    extension: Option<String>,
    checksum: Option<String>,
    file: Option<Bytes>,
    descriptor: Option<Bytes>,
}

impl UploadForm {
    fn coordinate_input(&mut self) -> AppResult<CoordinateInput> {
        if let Some(raw) = self.coordinate.take() {
            return Ok(CoordinateInput::Raw(raw));
        }
        match (self.group.take(), self.artifact_id.take(), self.version.take()) {
            (Some(group), Some(artifact_id), Some(version)) => Ok(CoordinateInput::Fields {
                group,
                artifact_id,
                version,
                classifier: self.classifier.take(),
                extension: self.extension.take(),
            }),
            _ => Err(AppError::BadRequest(
                "Either 'coordinate' or 'groupId', 'artifactId' and 'version' are required"
                    .to_string(),
            )),
        }
    }
}

/// Text fields are trimmed; an empty value counts as absent.
async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<Option<String>> {
    let text = field.text().await?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// `POST /api/upload/{storage}/{repo}`
///
/// Multipart form with `file`, the coordinate as `coordinate` or as
/// `groupId`/`artifactId`/`version` with optional `classifier`/`extension`, an
/// optional declared `checksum` and an optional `descriptor`.
pub async fn upload_artifact(
    State(state): State<Arc<AppState>>,
    Path((storage, repository)): Path<(String, String)>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, ApiJson<UploadReceipt>)> {
    info!(storage = %storage, repository = %repository, "Processing artifact upload");

    let mut form = UploadForm::default();
    let mut field_count = 0;

    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > MAX_MULTIPART_FIELDS {
            warn!(field_count = %field_count, "Too many multipart fields");
            return Err(AppError::BadRequest(format!(
                "Too many multipart fields: {field_count} (max: {MAX_MULTIPART_FIELDS})"
            )));
        }

        let name = field.name().unwrap_or("").to_string();
        debug!(field_name = %name, "Processing multipart field");
        match name.as_str() {
            "coordinate" => form.coordinate = text_field(field).await?,
            "groupId" => form.group = text_field(field).await?,
            "artifactId" => form.artifact_id = text_field(field).await?,
            "version" => form.version = text_field(field).await?,
            "classifier" => form.classifier = text_field(field).await?,
            "extension" => form.extension = text_field(field).await?,
            "checksum" => form.checksum = text_field(field).await?,
            "file" => form.file = Some(field.bytes().await?),
            "descriptor" => form.descriptor = Some(field.bytes().await?),
            _ => {
                let ignored = field.bytes().await?;
                debug!(field_name = %name, size = ignored.len(), "Ignoring unknown field");
            }
        }
    }

    let content = form
        .file
        .take()
        .ok_or_else(|| AppError::BadRequest("No file field found".to_string()))?;
    let descriptor = match form.descriptor.take() {
        Some(bytes) => DescriptorSource::Supplied(bytes),
        None => DescriptorSource::Absent,
    };
    let request = UploadRequest {
        storage,
        repository,
        coordinate: form.coordinate_input()?,
        content,
        declared_checksum: form.checksum.take(),
        descriptor,
    };

    let receipt = state.uploads.upload(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

// ---- admin ----

#[derive(Debug, Deserialize)]
pub struct CreateStorageRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRepositoryRequest {
    pub name: String,
    #[serde(default)]
    pub policy: VersionPolicy,
    #[serde(default)]
    pub descriptor: DescriptorPolicy,
}

pub async fn create_storage(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateStorageRequest>,
) -> AppResult<(StatusCode, ApiJson<Storage>)> {
    let storage = state.index.create_storage(&request.name).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(storage))))
}

pub async fn delete_storage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<ApiJson<Storage>> {
    let storage = state.index.delete_storage(id).await?;
    Ok(Json(ApiResponse::ok(storage)))
}

pub async fn create_repository(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<CreateRepositoryRequest>,
) -> AppResult<(StatusCode, ApiJson<Repository>)> {
    let mut repository = Repository::new(request.name, request.policy);
    repository.descriptor = request.descriptor;
    let repository = state.index.create_repository(id, repository).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(repository))))
}

pub async fn delete_repository(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(i64, String)>,
) -> AppResult<ApiJson<Repository>> {
    let repository = state.index.delete_repository(id, &name).await?;
    Ok(Json(ApiResponse::ok(repository)))
}

/// `PUT /api/admin/storages/{id}/repositories/{name}/settings`
pub async fn update_repository(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(i64, String)>,
    Json(settings): Json<RepositorySettings>,
) -> AppResult<ApiJson<Repository>> {
    if settings.is_empty() {
        return Err(AppError::BadRequest(
            "Nothing to update: expected visibility, active, policy or descriptor".to_string(),
        ));
    }
    let repository = state.index.update_repository(id, &name, &settings).await?;
    Ok(Json(ApiResponse::ok(repository)))
}

// ---- service ----

#[derive(Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub data_directory: String,
    pub storages: usize,
    pub repositories: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub authentication: bool,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    let storages = state.index.storages();
    Json(StatusReport {
        status: "ok",
        service: "artifact-server",
        version: env!("CARGO_PKG_VERSION"),
        data_directory: state.index.data_dir().display().to_string(),
        repositories: storages.iter().map(|s| s.repositories.len()).sum(),
        storages: storages.len(),
        started_at: state.started_at,
        authentication: crate::auth::is_auth_required(&state.config),
    })
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}
