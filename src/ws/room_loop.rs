use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{
    normalize_name, ChatMessage, JoinMessage, LeaveMessage, Message, UpdateMetadataMessage, UserMetadata,
    WelcomeMessage,
};
use crate::services::assist_service::{spawn_assist_pipeline, AssistRequest, AI_TRIGGER_PREFIX};
use crate::ws::room::{Room, RoomEvent, RoomServices};
use crate::ws::session::ClientHandle;

/// Participant metadata, keyed by id so snapshots come out sorted.
type Participants = BTreeMap<u32, UserMetadata>;

/// The room's event loop. Runs until the room token is cancelled or the
/// room has been empty for the idle timeout.
pub(super) async fn run(room: Arc<Room>, mut events: mpsc::Receiver<RoomEvent>, services: RoomServices) {
    let idle_timeout = services.settings.idle_timeout;
    let mut participants = Participants::new();
    let mut idle_deadline = idle_timeout.map(|t| Instant::now() + t);

    info!("Room {} started", room.id());

    loop {
        let deadline = idle_deadline;
        let idle = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = room.token().cancelled() => {
                info!("Room {} cancelled", room.id());
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_event(&room, &services, &mut participants, event);
                if !participants.is_empty() {
                    idle_deadline = None;
                } else if idle_deadline.is_none() {
                    idle_deadline = idle_timeout.map(|t| Instant::now() + t);
                }
            }
            _ = idle => {
                info!("Room {} has been empty for {:?}, closing", room.id(), idle_timeout.unwrap_or_default());
                break;
            }
        }
    }

    shut_down(&room, events);
}

fn shut_down(room: &Room, mut events: mpsc::Receiver<RoomEvent>) {
    // No new events after this; anyone still blocked in join() gets RoomError::Closed.
    events.close();
    while let Ok(event) = events.try_recv() {
        if let RoomEvent::Join { client, user } = event {
            debug!("Turning away user {} from closing room {}", user.id, room.id());
            client.close();
        }
    }
    for client in room.drain_roster() {
        client.close();
    }
    room.token().cancel();
    info!("Room {} closed", room.id());
}

fn handle_event(room: &Arc<Room>, services: &RoomServices, participants: &mut Participants, event: RoomEvent) {
    match event {
        RoomEvent::Join { client, user } => on_join(room, participants, client, user),
        RoomEvent::Leave { user_id } => on_leave(room, participants, user_id),
        RoomEvent::Custom { user_id, message } => match participants.get_mut(&user_id) {
            Some(user) => on_custom(room, services, user, message),
            None => debug!("Ignoring message from user {} who is not in room {}", user_id, room.id()),
        },
    }
}

fn on_join(room: &Room, participants: &mut Participants, client: ClientHandle, user: UserMetadata) {
    info!("{} (user {}) joined room {}", user.name, user.id, room.id());

    participants.insert(user.id, user.clone());
    room.register(client);

    let metadata = room.metadata();
    room.send_to_client(
        user.id,
        user.envelop(WelcomeMessage {
            users: participants.values().cloned().collect(),
            repo_hash: metadata.repo_hash.clone(),
            current_commit: metadata.current_commit.clone(),
            files: metadata.files.clone(),
        }),
    );
    room.broadcast_except(user.id, user.envelop(JoinMessage { user: user.clone() }));
}

fn on_leave(room: &Room, participants: &mut Participants, user_id: u32) {
    let Some(user) = participants.remove(&user_id) else {
        debug!("User {} already left room {}", user_id, room.id());
        return;
    };
    info!("{} (user {}) left room {}", user.name, user.id, room.id());

    room.unregister(user_id);
    room.broadcast(user.envelop(LeaveMessage {}));
}

fn on_custom(room: &Arc<Room>, services: &RoomServices, user: &mut UserMetadata, message: Message) {
    match message {
        Message::Chat(chat) => on_chat(room, services, user, chat),
        Message::UpdateMetadata(update) => {
            let applied = apply_update(user, update);
            debug!("User {} in room {} updated metadata: {:?}", user.id, room.id(), applied);
            room.broadcast_except(user.id, user.envelop(applied));
        }
        other => warn!(
            "Dropping unhandled '{}' message from user {} in room {}",
            other.discriminator(),
            user.id,
            room.id()
        ),
    }
}

fn on_chat(room: &Arc<Room>, services: &RoomServices, user: &UserMetadata, chat: ChatMessage) {
    let trigger = chat.content.strip_prefix(AI_TRIGGER_PREFIX).map(str::to_string);
    room.broadcast_except(user.id, user.envelop(chat));

    if let Some(text) = trigger {
        spawn_assist_pipeline(
            room.clone(),
            services.clone(),
            AssistRequest {
                requester_id: user.id,
                active_file: user.active_file.clone(),
                text,
            },
        );
    }
}

/// Apply the present fields of `update` to `user` and return what was applied.
fn apply_update(user: &mut UserMetadata, update: UpdateMetadataMessage) -> UpdateMetadataMessage {
    let mut applied = UpdateMetadataMessage::default();
    if let Some(active_file) = update.active_file {
        user.active_file = active_file.clone();
        applied.active_file = Some(active_file);
    }
    if let Some(name) = update.name {
        let name = normalize_name(&name);
        user.name = name.clone();
        applied.name = Some(name);
    }
    applied
}
