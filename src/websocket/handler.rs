use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Path, Query, State},
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::{Envelope, ErrorResponse, ApiError, UserMetadata};
use crate::websocket::codec::{decode_inbound, encode_outbound};
use crate::ws::{ClientHandle, Room};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    #[serde(default)]
    pub name: String,
}

/// WebSocket handler for a repository room
///
/// The room is resolved before the upgrade, so a repository that cannot be
/// synced is refused with 502 instead of an open-then-closed socket.
pub async fn room_websocket(
    Path(repo): Path<String>,
    Query(query): Query<JoinQuery>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    info!("New WebSocket connection attempt for {}", repo);

    let room = state.registry.get_or_create_room(&repo).await.map_err(|e| {
        ErrorResponse::reply(StatusCode::BAD_GATEWAY, format!("failed to open repository: {}", e))
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room, query.name)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room: Arc<Room>, name: String) {
    let user = UserMetadata::new(state.user_ids.next_id(), name);
    let user_id = user.id;

    let Some((room, client, mut outbound)) = join_room(&state, room, user).await else {
        return;
    };
    info!("WebSocket connection established for room {} as user {}", room.id(), user_id);

    let (mut sender, mut receiver) = socket.split();
    let token = client.token().clone();

    // Drain the outbound queue into the socket
    let writer_token = token.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let envelope = tokio::select! {
                _ = writer_token.cancelled() => break,
                envelope = outbound.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            let frame = match encode_outbound(&envelope) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode message for user {}: {}", user_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Feed client frames to the room
    let reader_room = room.clone();
    let reader_token = token.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = reader_token.cancelled() => break,
                frame = receiver.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => match decode_inbound(&text) {
                    Ok(message) => {
                        if reader_room.handle_client_data(user_id, message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping frame from user {} in room {}: {}", user_id, reader_room.id(), e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("WebSocket error for user {}: {}", user_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    token.cancel();
    if room.leave(user_id).await.is_err() {
        debug!("Room {} closed before user {} left", room.id(), user_id);
    }
    info!("WebSocket connection terminated for room {} user {}", room.id(), user_id);
}

/// Register the user, retrying once if the room closed underneath us.
async fn join_room(
    state: &AppState,
    mut room: Arc<Room>,
    user: UserMetadata,
) -> Option<(Arc<Room>, ClientHandle, mpsc::Receiver<Arc<Envelope>>)> {
    for attempt in 0..2 {
        let (client, outbound) = room.new_session(user.id);
        match room.join(client.clone(), user.clone()).await {
            Ok(()) => return Some((room, client, outbound)),
            Err(e) if attempt == 0 => {
                warn!("{} while joining user {}, resolving again", e, user.id);
                room = match state.registry.get_or_create_room(room.id()).await {
                    Ok(room) => room,
                    Err(e) => {
                        error!("Failed to reopen room for user {}: {}", user.id, e);
                        return None;
                    }
                };
            }
            Err(e) => {
                error!("Giving up on user {}: {}", user.id, e);
                return None;
            }
        }
    }
    None
}
