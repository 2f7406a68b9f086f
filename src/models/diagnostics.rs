
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One live room as seen by the diagnostics endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RoomDiagnostics {
    pub room_id: String,
    pub repo_hash: String,
    pub current_commit: String,
    pub n_participants: u32,
    pub n_files: u32,
}

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_rooms: u32,
    pub n_conn: u32,
    pub uptime_secs: i64,
    pub rooms: Vec<RoomDiagnostics>,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
