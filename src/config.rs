use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Level for this crate and tower_http when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where repositories are checked out, one directory per repo hash
    #[serde(default = "default_repo_base_path")]
    pub repo_base_path: String,

    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    /// Without a key the assistant answers every request with an error
    pub anthropic_api_key: Option<String>,

    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    #[serde(default = "default_anthropic_api_url")]
    pub anthropic_api_url: String,

    #[serde(default = "default_anthropic_max_tokens")]
    pub anthropic_max_tokens: u32,

    /// Messages buffered per client before the client is dropped as stalled
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Events buffered per room
    #[serde(default = "default_queue_capacity")]
    pub room_event_capacity: usize,

    /// Seconds an empty room lives on; 0 keeps rooms forever
    #[serde(default = "default_room_idle_timeout_secs")]
    pub room_idle_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Runs before the subscriber exists, so the caller does the logging
        Ok(envy::from_env::<Config>()?)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fallback tracing filter used when RUST_LOG is unset.
    pub fn log_filter(&self) -> String {
        format!(
            "gittyup={level},tower_http={level},axum::rejection=trace,info",
            level = self.log_level
        )
    }

    pub fn repo_base_path(&self) -> PathBuf {
        PathBuf::from(&self.repo_base_path)
    }

    pub fn room_idle_timeout(&self) -> Option<Duration> {
        match self.room_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Allowed CORS origins, empty when unset.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            cors_origins: None,
            repo_base_path: default_repo_base_path(),
            git_binary: default_git_binary(),
            anthropic_api_key: None,
            anthropic_model: default_anthropic_model(),
            anthropic_api_url: default_anthropic_api_url(),
            anthropic_max_tokens: default_anthropic_max_tokens(),
            outbound_queue_capacity: default_queue_capacity(),
            room_event_capacity: default_queue_capacity(),
            room_idle_timeout_secs: default_room_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_repo_base_path() -> String {
    "repos".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_anthropic_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    4096
}

fn default_queue_capacity() -> usize {
    256
}

fn default_room_idle_timeout_secs() -> u64 {
    300
}
