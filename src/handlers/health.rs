use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, error};

use crate::models::{ApiError, ErrorResponse, HealthResponse, ReadyResponse};
use crate::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint
///
/// Ready once the repository base directory exists and can be created.
pub async fn ready_check(State(state): State<Arc<AppState>>) -> Result<Json<ReadyResponse>, ApiError> {
    debug!("Readiness check requested");
    let base = state.config.repo_base_path();
    if let Err(e) = tokio::fs::create_dir_all(&base).await {
        error!("Repository base path {} is unusable: {}", base.display(), e);
        return Err(ErrorResponse::reply(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("repository base path unavailable: {}", e),
        ));
    }
    Ok(Json(ReadyResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
        repo_base_path: base.display().to_string(),
    }))
}
