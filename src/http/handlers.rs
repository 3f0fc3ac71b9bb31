use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::app::catalog::VideoCard;
use crate::app::ingest::BatchReport;
use crate::domain::video::UploadCandidate;
use crate::http::AppError;
use crate::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

#[derive(Serialize)]
pub struct PlaybackResponse {
    pub url: String,
}

#[derive(Serialize)]
pub struct UploadStatusResponse {
    pub busy: bool,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.catalog.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ListResponse<VideoCard>>, AppError> {
    let query = query.q.unwrap_or_default();
    let items = state.catalog.list(&query).await?;

    Ok(Json(ListResponse { items }))
}

pub async fn playback_url(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PlaybackResponse>, AppError> {
    match state.catalog.playback_url(id).await? {
        Some(url) => Ok(Json(PlaybackResponse { url })),
        None => Err(AppError::not_found("video not found")),
    }
}

pub async fn upload_status(State(state): State<AppState>) -> Json<UploadStatusResponse> {
    Json(UploadStatusResponse {
        busy: state.ingest.is_busy(),
    })
}

pub async fn upload_videos(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let max_bytes = state.ingest.settings().max_bytes;
    let mut files = Vec::new();

    loop {
        let field = multipart.next_field().await.map_err(|err| {
            tracing::warn!(error = %err, "failed to read multipart body");
            AppError::bad_request("invalid multipart body")
        })?;
        let Some(field) = field else {
            break;
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(base_name)
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        files.push(spool_field(field, file_name, content_type, max_bytes).await?);
    }

    if files.is_empty() {
        return Err(AppError::bad_request("no files in upload"));
    }

    // The batch runs to completion even if the client goes away.
    let ingest = state.ingest.clone();
    let report = tokio::spawn(async move { ingest.ingest(files).await })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "ingest batch aborted");
            AppError::internal("upload failed")
        })?;

    Ok(Json(report))
}

/// Streams one multipart file to a temporary file. Bytes past `max_bytes`
/// are counted but not stored; the pipeline rejects such files.
async fn spool_field(
    mut field: Field<'_>,
    file_name: String,
    content_type: String,
    max_bytes: Option<u64>,
) -> Result<UploadCandidate, AppError> {
    let (file, spool) = tempfile::NamedTempFile::new()
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create spool file");
            AppError::internal("failed to store upload")
        })?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut bytes: u64 = 0;
    loop {
        let chunk = field.chunk().await.map_err(|err| {
            tracing::warn!(error = %err, file = %file_name, "failed to read upload");
            AppError::bad_request("failed to read upload")
        })?;
        let Some(chunk) = chunk else {
            break;
        };

        bytes += chunk.len() as u64;
        if max_bytes.map_or(true, |max| bytes <= max) {
            file.write_all(&chunk).await.map_err(|err| {
                tracing::error!(error = ?err, file = %file_name, "failed to spool upload");
                AppError::internal("failed to store upload")
            })?;
        }
    }
    file.flush().await.map_err(|err| {
        tracing::error!(error = ?err, file = %file_name, "failed to spool upload");
        AppError::internal("failed to store upload")
    })?;

    Ok(UploadCandidate::spooled(file_name, content_type, spool, bytes))
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
