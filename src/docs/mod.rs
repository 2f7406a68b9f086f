use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Repository storage unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Room and process diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current diagnostics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Join the collaboration room of a repository over WebSocket
#[utoipa::path(
    get,
    path = "/v1/repo/{repo}",
    params(
        ("repo" = String, Path, description = "Repository identifier, e.g. github.com/owner/name"),
        ("name" = Option<String>, Query, description = "Display name")
    ),
    responses(
        (status = 101, description = "Switching to the room protocol"),
        (status = 502, description = "Repository could not be synced", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_websocket_doc() {}

/// Raw file contents at a commit
#[utoipa::path(
    get,
    path = "/v1/file/{repo_hash}/{commit}/{path}",
    params(
        ("repo_hash" = String, Path, description = "Repository hash from the welcome message"),
        ("commit" = String, Path, description = "Commit to read from"),
        ("path" = String, Path, description = "File path inside the repository")
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 400, description = "Invalid repository hash or commit", body = ErrorResponse),
        (status = 404, description = "Repository or file not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn repo_file_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        room_websocket_doc,
        repo_file_doc,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, DiagnosticsResponse, RoomDiagnostics, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
