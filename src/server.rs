// HTTP surface
//
// Thin plumbing around the orchestrator: route registration, query
// extraction, error-to-status mapping, and attachment streaming. No
// orchestration logic lives here.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::downloader::artifact::Artifact;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{AudioInfo, ProgressSnapshot, VideoInfo};
use crate::downloader::orchestrator::Orchestrator;
use crate::downloader::progress::JobRegistry;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<JobRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info/video", get(video_info))
        .route("/info/audio", get(audio_info))
        .route("/download/video", get(download_video))
        .route("/download/audio", get(download_audio))
        .route("/progress/{job_id}", get(progress))
        .with_state(state)
}

/// Caller-visible error: every category carries its own status code and a
/// stable machine-readable kind next to the human-readable message.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        let status = match &err {
            DownloadError::InvalidInput => StatusCode::BAD_REQUEST,
            DownloadError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            DownloadError::AccessRestricted(_) => StatusCode::FORBIDDEN,
            DownloadError::Unavailable(_) => StatusCode::NOT_FOUND,
            DownloadError::UnknownProvider(_) => StatusCode::BAD_GATEWAY,
            DownloadError::LocalIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DownloadError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(kind = self.kind, message = %self.message, "request failed");
        }
        let body = json!({
            "error": self.message,
            "kind": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct InfoParams {
    url: Option<String>,
}

#[derive(Deserialize)]
struct VideoDownloadParams {
    url: Option<String>,
    quality: Option<String>,
    job_id: Option<String>,
}

#[derive(Deserialize)]
struct AudioDownloadParams {
    url: Option<String>,
    job_id: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

async fn video_info(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> ApiResult<Json<VideoInfo>> {
    let info = state
        .orchestrator
        .video_info(params.url.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(info))
}

async fn audio_info(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> ApiResult<Json<AudioInfo>> {
    let info = state
        .orchestrator
        .audio_info(params.url.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(info))
}

async fn download_video(
    State(state): State<AppState>,
    Query(params): Query<VideoDownloadParams>,
) -> ApiResult<Response> {
    let artifact = state
        .orchestrator
        .download_video(
            params.url.as_deref().unwrap_or(""),
            params.quality.as_deref(),
            params.job_id,
        )
        .await?;
    attachment_response(artifact).await
}

async fn download_audio(
    State(state): State<AppState>,
    Query(params): Query<AudioDownloadParams>,
) -> ApiResult<Response> {
    let artifact = state
        .orchestrator
        .download_audio(params.url.as_deref().unwrap_or(""), params.job_id)
        .await?;
    attachment_response(artifact).await
}

async fn progress(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Json<ProgressSnapshot> {
    Json(state.registry.get(&job_id))
}

/// Stream an artifact as an attachment. The artifact's backing file is
/// deleted when the body stream drops, however the transfer ends.
async fn attachment_response(artifact: Artifact) -> ApiResult<Response> {
    let mime = mime_guess::from_path(artifact.path()).first_or_octet_stream();
    // quotes and backslashes would corrupt the header; everything else was
    // sanitized with the title
    let filename = artifact.download_name().replace(['"', '\\'], "_");

    let stream = artifact
        .open_stream()
        .await
        .map_err(|e| ApiError::from(DownloadError::LocalIo(e.to_string())))?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    match HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(_) => {
            headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
        }
    }
    Ok(response)
}
