use crate::{
    docs::ApiDoc,
    handlers::{diagnostics, health_check, ready_check, repo_file},
    websocket::room_websocket,
    AppState,
};
use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .with_state(state)
}

/// Create the full application router
pub fn create_app_routes(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origin_list());

    Router::<Arc<AppState>>::new()
        .route("/v1/repo/*repo", get(room_websocket))
        .route("/v1/file/:repo_hash/:commit/*path", get(repo_file))
        .with_state(state.clone())
        // Mount API routes
        .nest("/api", create_api_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new().allow_origin(allowed)
    }
}
