use gittyup::clients::anthropic_client::AnthropicClient;
use gittyup::clients::llm_client::{LanguageModel, UnconfiguredModel};
use gittyup::config::Config;
use gittyup::routes::create_app_routes;
use gittyup::services::git_service::GitCli;
use gittyup::AppState;
use std::panic;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration first so LOG_LEVEL can shape the subscriber
    let loaded = Config::load();
    let fallback_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config::default().log_filter(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter.into()))
        .init();

    info!("Starting server...");

    let config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
            Config::default()
        }
    };

    let llm = language_model(&config);
    let vcs = Arc::new(GitCli::new(config.git_binary.clone()));

    // Cancelling the root tears down every room
    let root = CancellationToken::new();
    let address = config.server_address();
    let state = Arc::new(AppState::new(config, vcs, llm, root.clone()));
    let app_routes = create_app_routes(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 Rooms available at ws://{}/v1/repo/<repository>", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal(root))
        .await
        .expect("Server failed to start");

    info!("Server stopped");
}

fn language_model(config: &Config) -> Arc<dyn LanguageModel> {
    let Some(api_key) = config.anthropic_api_key.clone() else {
        warn!("ANTHROPIC_API_KEY not set - @ai requests will fail");
        return Arc::new(UnconfiguredModel);
    };
    match AnthropicClient::new(
        config.anthropic_api_url.clone(),
        api_key,
        config.anthropic_model.clone(),
        config.anthropic_max_tokens,
    ) {
        Ok(client) => {
            info!("Using Anthropic model {}", config.anthropic_model);
            Arc::new(client)
        }
        Err(e) => {
            error!("Failed to create Anthropic client: {}", e);
            Arc::new(UnconfiguredModel)
        }
    }
}

async fn shutdown_signal(root: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, closing rooms");
    root.cancel();
}
