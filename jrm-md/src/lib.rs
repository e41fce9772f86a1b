//! # Jamroom Media Delivery Library (jrm-md)
//!
//! Derived-artifact cache with streaming HTTP delivery.
//!
//! **Purpose:** Lazily convert raw media (lossless audio, raw cover
//! images, remotely-sourced video) into efficient streamable formats on
//! first request, cache the results durably, and serve them with
//! single-flight derivation per resource.

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod backends;
pub mod cache;
pub mod config;
pub mod db;

use backends::{AudioTranscoder, CoverTranscoder, RemoteVideoFetcher};
use cache::MediaCache;
use config::TranscodeSettings;
use db::SqliteArtifactStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Derived-artifact cache engine
    pub cache: Arc<MediaCache>,
    /// Song audio backend
    pub audio: Arc<AudioTranscoder>,
    /// Album cover backend
    pub cover: Arc<CoverTranscoder>,
    /// Remote video backend
    pub video: Arc<RemoteVideoFetcher>,
    /// Fired on graceful shutdown; in-flight derivations clean up and abort
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state with backends built from the transcode
    /// settings loaded at startup
    pub fn new(
        db: SqlitePool,
        cache_dir: PathBuf,
        tuning: TranscodeSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let store = Arc::new(SqliteArtifactStore::new(db.clone()));
        let cache = Arc::new(MediaCache::new(cache_dir, store));
        Self {
            db,
            cache,
            audio: Arc::new(AudioTranscoder::new(tuning.audio_bitrate_kbps)),
            cover: Arc::new(CoverTranscoder::new(
                tuning.cover_max_width,
                tuning.cover_quality,
            )),
            video: Arc::new(RemoteVideoFetcher::new()),
            shutdown,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health_check))
        .route("/api/media/audio/:song_id", get(api::media::stream_audio))
        .route("/api/media/cover/:album_id", get(api::media::stream_cover))
        .route("/api/media/video/:video_id", get(api::media::stream_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
