use crate::{models::{DiagnosticsResponse, RoomDiagnostics}, AppState};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Room, connection and process statistics
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {

    // Aggregate diagnostics from the registry
    let mut n_conn: u32 = 0;
    let mut rooms = Vec::new();
    for room in state.registry.rooms() {
        if room.is_closed() {
            continue;
        }
        let n_participants = room.participant_count() as u32;
        n_conn += n_participants;
        let metadata = room.metadata();
        rooms.push(RoomDiagnostics {
            room_id: room.id().to_string(),
            repo_hash: metadata.repo_hash.clone(),
            current_commit: metadata.current_commit.clone(),
            n_participants,
            n_files: metadata.files.len() as u32,
        });
    }
    rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
    let n_rooms = rooms.len() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_rooms
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms,
            n_conn,
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            rooms,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
