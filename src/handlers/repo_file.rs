use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::models::{ApiError, ErrorResponse};
use crate::services::repo_service::is_valid_repo_hash;
use crate::AppState;

/// Content type for a file served from a repository, by extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("xml") => "text/xml; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("zip") => "application/zip",
        Some("md") => "text/markdown; charset=utf-8",
        _ => "text/plain; charset=utf-8",
    }
}

fn is_valid_commit(commit: &str) -> bool {
    !commit.is_empty() && !commit.starts_with('-') && commit.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

/// Raw contents of a file at a given commit of a synced repository
pub async fn repo_file(
    Path((repo_hash, commit, path)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if !is_valid_repo_hash(&repo_hash) {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "invalid repository hash"));
    }
    if !is_valid_commit(&commit) {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "invalid commit"));
    }

    let repo_path = state.config.repo_base_path().join(&repo_hash);
    if !repo_path.is_dir() {
        debug!("Repository {} has not been synced", repo_hash);
        return Err(ErrorResponse::reply(StatusCode::NOT_FOUND, "repository not found"));
    }

    let contents = state
        .vcs()
        .show_file_at_commit(&repo_path, &commit, &path)
        .await
        .map_err(|e| {
            warn!("Failed to read {} at {} in {}: {}", path, commit, repo_hash, e);
            ErrorResponse::reply(StatusCode::NOT_FOUND, "file not found")
        })?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&path))], contents).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::repo_service::hash_room_id;
    use crate::services::testing::{FakeVcs, ScriptedModel};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn state(dir: &TempDir) -> Arc<AppState> {
        let config = Config {
            repo_base_path: dir.path().display().to_string(),
            ..Config::default()
        };
        let vcs = Arc::new(FakeVcs::new("c0ffee", &[("README.md", "# Widgets\n")]));
        Arc::new(AppState::new(config, vcs, Arc::new(ScriptedModel::new(vec![])), CancellationToken::new()))
    }

    async fn get(state: &Arc<AppState>, hash: &str, commit: &str, path: &str) -> Result<Response, ApiError> {
        repo_file(
            Path((hash.to_string(), commit.to_string(), path.to_string())),
            State(state.clone()),
        )
        .await
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("index.HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("assets/logo.png"), "image/png");
        assert_eq!(content_type_for("src/main.rs"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("Makefile"), "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_serves_file_at_commit() {
        let dir = TempDir::new().unwrap();
        let hash = hash_room_id("github.com/acme/widgets");
        std::fs::create_dir_all(dir.path().join(&hash)).unwrap();
        let state = state(&dir);

        let response = get(&state, &hash, "c0ffee", "README.md").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
    }

    fn error_of(result: Result<Response, ApiError>) -> (StatusCode, String) {
        match result {
            Ok(response) => panic!("expected an error, got {}", response.status()),
            Err((status, body)) => (status, body.0.error),
        }
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let dir = TempDir::new().unwrap();
        let hash = hash_room_id("github.com/acme/widgets");
        let state = state(&dir);

        let (status, _) = error_of(get(&state, "not-a-hash", "c0ffee", "README.md").await);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_of(get(&state, &hash, "--output=x", "README.md").await);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, error) = error_of(get(&state, &hash, "c0ffee", "README.md").await);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error, "repository not found");

        std::fs::create_dir_all(dir.path().join(&hash)).unwrap();
        let (status, error) = error_of(get(&state, &hash, "c0ffee", "missing.txt").await);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error, "file not found");

        let (status, _) = error_of(get(&state, &hash, "0ld", "README.md").await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
