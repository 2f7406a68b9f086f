use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clients::llm_client::LanguageModel;
use crate::models::{Envelope, Message, RoomMetadata, UserMetadata};
use crate::services::git_service::VersionControl;
use crate::ws::room_loop;
use crate::ws::session::ClientHandle;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room '{0}' is closed")]
    Closed(String),
}

/// Tunables shared by every room.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub repo_base_path: PathBuf,
    pub event_capacity: usize,
    pub outbound_capacity: usize,
    /// How long an empty room survives. `None` keeps rooms forever.
    pub idle_timeout: Option<Duration>,
}

/// Collaborators handed down from the registry to rooms and their pipelines.
#[derive(Clone)]
pub struct RoomServices {
    pub vcs: Arc<dyn VersionControl>,
    pub llm: Arc<dyn LanguageModel>,
    pub settings: Arc<RoomSettings>,
}

/// Input to the room loop, processed strictly in arrival order.
#[derive(Debug)]
pub enum RoomEvent {
    Join { client: ClientHandle, user: UserMetadata },
    Leave { user_id: u32 },
    Custom { user_id: u32, message: Message },
}

/// One live room.
///
/// Participant metadata is owned by the loop task alone. Other tasks either
/// enqueue a [`RoomEvent`] or use the delivery methods, which only read the
/// roster of outbound handles.
pub struct Room {
    id: String,
    metadata: Arc<RoomMetadata>,
    roster: RwLock<BTreeMap<u32, ClientHandle>>,
    events: mpsc::Sender<RoomEvent>,
    token: CancellationToken,
    outbound_capacity: usize,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("current_commit", &self.metadata.current_commit)
            .field("participants", &self.participant_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Room {
    /// Create the room and spawn its loop.
    pub fn start(id: String, metadata: RoomMetadata, services: RoomServices, parent: &CancellationToken) -> Arc<Room> {
        let (events_tx, events_rx) = mpsc::channel(services.settings.event_capacity.max(1));
        let room = Arc::new(Room {
            id,
            metadata: Arc::new(metadata),
            roster: RwLock::new(BTreeMap::new()),
            events: events_tx,
            token: parent.child_token(),
            outbound_capacity: services.settings.outbound_capacity,
            created_at: Utc::now(),
        });
        tokio::spawn(room_loop::run(room.clone(), events_rx, services));
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &Arc<RoomMetadata> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn participant_count(&self) -> usize {
        self.read_roster().len()
    }

    /// Outbound handle for a new participant, tied to this room's lifetime.
    pub fn new_session(&self, user_id: u32) -> (ClientHandle, mpsc::Receiver<Arc<Envelope>>) {
        ClientHandle::channel(user_id, self.outbound_capacity, &self.token)
    }

    pub async fn join(&self, client: ClientHandle, user: UserMetadata) -> Result<(), RoomError> {
        self.enqueue(RoomEvent::Join { client, user }).await
    }

    pub async fn leave(&self, user_id: u32) -> Result<(), RoomError> {
        self.enqueue(RoomEvent::Leave { user_id }).await
    }

    pub async fn handle_client_data(&self, user_id: u32, message: Message) -> Result<(), RoomError> {
        self.enqueue(RoomEvent::Custom { user_id, message }).await
    }

    async fn enqueue(&self, event: RoomEvent) -> Result<(), RoomError> {
        self.events
            .send(event)
            .await
            .map_err(|_| RoomError::Closed(self.id.clone()))
    }

    /// Deliver to one participant. Returns false if they are not in the room.
    pub fn send_to_client(&self, user_id: u32, envelope: Envelope) -> bool {
        let roster = self.read_roster();
        match roster.get(&user_id) {
            Some(client) => {
                client.deliver(Arc::new(envelope));
                true
            }
            None => {
                debug!("User {} is not in room {}", user_id, self.id);
                false
            }
        }
    }

    pub fn broadcast(&self, envelope: Envelope) {
        self.deliver_where(envelope, |_| true);
    }

    pub fn broadcast_except(&self, except_user_id: u32, envelope: Envelope) {
        self.deliver_where(envelope, |id| id != except_user_id);
    }

    fn deliver_where(&self, envelope: Envelope, include: impl Fn(u32) -> bool) {
        let envelope = Arc::new(envelope);
        let roster = self.read_roster();
        for client in roster.values().filter(|c| include(c.id())) {
            client.deliver(envelope.clone());
        }
    }

    /// Loop only.
    pub(super) fn register(&self, client: ClientHandle) {
        self.write_roster().insert(client.id(), client);
    }

    /// Loop only.
    pub(super) fn unregister(&self, user_id: u32) -> Option<ClientHandle> {
        self.write_roster().remove(&user_id)
    }

    /// Loop only, on shutdown.
    pub(super) fn drain_roster(&self) -> Vec<ClientHandle> {
        std::mem::take(&mut *self.write_roster()).into_values().collect()
    }

    fn read_roster(&self) -> RwLockReadGuard<'_, BTreeMap<u32, ClientHandle>> {
        // Deliveries never panic while holding the lock, so poisoning only
        // means some unrelated thread died; the map itself is intact.
        self.roster.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_roster(&self) -> RwLockWriteGuard<'_, BTreeMap<u32, ClientHandle>> {
        self.roster.write().unwrap_or_else(|e| e.into_inner())
    }
}
