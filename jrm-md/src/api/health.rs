//! Health check endpoint

use axum::Json;
use serde::Serialize;

/// Health check response: status, module name, and version
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub build: String,
}

/// GET /health
///
/// Health check endpoint for monitoring. Does NOT require authentication.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "jrm-md".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!("{} ({})", env!("GIT_HASH"), env!("BUILD_PROFILE")),
    })
}
