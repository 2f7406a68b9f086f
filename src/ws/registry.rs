use std::sync::Arc;

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::services::repo_service::{sync_room_repo, RoomInitError};
use crate::ws::room::{Room, RoomServices};

/// Live rooms keyed by repository identifier.
///
/// The cache has no capacity bound, so it never evicts a live room. An entry
/// leaves only when its room closes, removed by the watcher spawned alongside it.
pub struct RoomRegistry {
    rooms: Cache<String, Arc<Room>>,
    services: RoomServices,
    root: CancellationToken,
}

impl RoomRegistry {
    pub fn new(services: RoomServices, root: CancellationToken) -> Self {
        let rooms = Cache::builder().build();
        info!("Room registry initialized");
        Self { rooms, services, root }
    }

    pub fn services(&self) -> &RoomServices {
        &self.services
    }

    /// Return the live room for `room_id`, initializing it if needed.
    ///
    /// Concurrent callers for the same identifier share one initialization
    /// and all see its outcome. A failed initialization registers nothing.
    pub async fn get_or_create_room(&self, room_id: &str) -> Result<Arc<Room>, Arc<RoomInitError>> {
        if let Some(room) = self.rooms.get(room_id).await {
            if !room.is_closed() {
                return Ok(room);
            }
            // Closed but its watcher has not caught up yet.
            remove_if_current(&self.rooms, room_id, &room).await;
        }

        let room = self
            .rooms
            .try_get_with(room_id.to_string(), self.init_room(room_id))
            .await
            .inspect_err(|e| error!("Failed to initialize room {}: {}", room_id, e))?;
        Ok(room)
    }

    async fn init_room(&self, room_id: &str) -> Result<Arc<Room>, RoomInitError> {
        let settings = &self.services.settings;
        let metadata = sync_room_repo(self.services.vcs.as_ref(), &settings.repo_base_path, room_id).await?;
        info!(
            "Initialized room {} at commit {} ({} files)",
            room_id,
            metadata.current_commit,
            metadata.files.len()
        );

        let room = Room::start(room_id.to_string(), metadata, self.services.clone(), &self.root);
        self.watch(room.clone());
        Ok(room)
    }

    fn watch(&self, room: Arc<Room>) {
        let rooms = self.rooms.clone();
        tokio::spawn(async move {
            room.token().cancelled().await;
            remove_if_current(&rooms, room.id(), &room).await;
        });
    }

    /// Snapshot of the registered rooms.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|(_, room)| room).collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.iter().count()
    }
}

/// Remove `room_id` only if it still maps to `room`, never a successor.
async fn remove_if_current(rooms: &Cache<String, Arc<Room>>, room_id: &str, room: &Arc<Room>) {
    let closed = room.clone();
    let result = rooms
        .entry(room_id.to_string())
        .and_compute_with(|entry| async move {
            match entry {
                Some(entry) if Arc::ptr_eq(entry.value(), &closed) => Op::Remove,
                _ => Op::Nop,
            }
        })
        .await;
    if let CompResult::Removed(_) = result {
        debug!("Removed closed room {} from the registry", room_id);
    }
}
