pub mod clients;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod websocket;
pub mod ws;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::clients::llm_client::LanguageModel;
use crate::config::Config;
use crate::services::git_service::VersionControl;
use crate::ws::{RoomRegistry, RoomServices, RoomSettings, UserIdAllocator};

/// Shared state behind every route.
pub struct AppState {
    pub config: Config,
    pub registry: RoomRegistry,
    pub user_ids: UserIdAllocator,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Rooms opened through this state are torn down when `root` is cancelled.
    pub fn new(
        config: Config,
        vcs: Arc<dyn VersionControl>,
        llm: Arc<dyn LanguageModel>,
        root: CancellationToken,
    ) -> Self {
        let settings = RoomSettings {
            repo_base_path: config.repo_base_path(),
            event_capacity: config.room_event_capacity,
            outbound_capacity: config.outbound_queue_capacity,
            idle_timeout: config.room_idle_timeout(),
        };
        let services = RoomServices {
            vcs,
            llm,
            settings: Arc::new(settings),
        };
        Self {
            registry: RoomRegistry::new(services, root),
            user_ids: UserIdAllocator::new(),
            started_at: Utc::now(),
            config,
        }
    }

    pub fn vcs(&self) -> &Arc<dyn VersionControl> {
        &self.registry.services().vcs
    }
}
