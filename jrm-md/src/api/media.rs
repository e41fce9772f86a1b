//! Media streaming handlers
//!
//! Each handler asks the cache for the derived artifact and pipes the
//! returned file to the client with the stored content type. The cache
//! error taxonomy maps onto HTTP: NotFound → 404, Internal → 500.
//! Range requests are not handled here.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::{CacheError, DerivationBackend, ResourceKind};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

/// GET /api/media/audio/:song_id - Stream transcoded song audio
pub async fn stream_audio(State(state): State<AppState>, Path(song_id): Path<Uuid>) -> Response {
    stream_artifact(
        &state,
        ResourceKind::Audio,
        &song_id.to_string(),
        state.audio.as_ref(),
    )
    .await
}

/// GET /api/media/cover/:album_id - Stream compressed album cover
pub async fn stream_cover(State(state): State<AppState>, Path(album_id): Path<Uuid>) -> Response {
    stream_artifact(
        &state,
        ResourceKind::Cover,
        &album_id.to_string(),
        state.cover.as_ref(),
    )
    .await
}

/// GET /api/media/video/:video_id - Stream locally cached remote video
///
/// The video id is an external identifier supplied by clients, so it is
/// validated before being used as a cache filename.
pub async fn stream_video(State(state): State<AppState>, Path(video_id): Path<String>) -> Response {
    if !is_valid_video_id(&video_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                status: "error: invalid video id".to_string(),
            }),
        )
            .into_response();
    }

    stream_artifact(&state, ResourceKind::Video, &video_id, state.video.as_ref()).await
}

/// External video ids are limited to the URL-safe charset
fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Fetch from the cache and turn the outcome into an HTTP response
async fn stream_artifact(
    state: &AppState,
    kind: ResourceKind,
    key: &str,
    backend: &dyn DerivationBackend,
) -> Response {
    match state.cache.fetch(kind, key, backend, &state.shutdown).await {
        Ok(artifact) => {
            let stream = ReaderStream::new(artifact.file);
            (
                [(header::CONTENT_TYPE, artifact.content_type)],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Err(CacheError::NotFound(reason)) => {
            info!(%kind, key, reason, "media not found");
            (
                StatusCode::NOT_FOUND,
                Json(StatusResponse {
                    status: format!("error: {}", reason),
                }),
            )
                .into_response()
        }
        Err(CacheError::Cancelled) => {
            // Service is shutting down or the request was withdrawn; the
            // client is normally gone before this response is written
            debug!(%kind, key, "media request cancelled");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: "error: request cancelled".to_string(),
                }),
            )
                .into_response()
        }
        Err(CacheError::Internal(reason)) => {
            error!(%kind, key, reason, "media delivery failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: format!("error: {}", reason),
                }),
            )
                .into_response()
        }
    }
}
