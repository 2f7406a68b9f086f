use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::llm_client::{AssistUpdate, TurnRequest};
use crate::models::{LlmDeltaMessage, UserMetadata};
use crate::services::assist_tools::assist_tool_set;
use crate::services::git_service::GitError;
use crate::services::repo_service::RepoScope;
use crate::ws::room::{Room, RoomServices};

/// Chat prefix that hands the rest of the message to the assistant.
pub const AI_TRIGGER_PREFIX: &str = "@ai ";

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("requester has no active file")]
    NoActiveFile,
    #[error("error reading {path:?}: {source}")]
    ActiveFile {
        path: String,
        #[source]
        source: GitError,
    },
    #[error("error from LLM: {0}")]
    Model(String),
}

/// One `@ai` request, captured when the chat message was handled.
#[derive(Debug, Clone)]
pub struct AssistRequest {
    pub requester_id: u32,
    pub active_file: String,
    pub text: String,
}

/// Correlates every delta of a single assistant reply.
pub fn new_request_id() -> String {
    format!("r{}", Uuid::new_v4().simple())
}

pub fn build_system_prompt(files: &[String], active_path: &str, active_content: &str) -> String {
    format!(
        "Succinctly solve the user's request. Feel free to think through the problem out loud, and read files if necessary. \
         However, once you submit your solution, you will not be able to do more so remember you just have one shot. \
         Here are all files in the repo:\n\n{}\n\nThe user is currently looking at: {}\n\nContent of {:?}:\n\n{}",
        files.join("\n"),
        active_path,
        active_path,
        active_content
    )
}

/// Start a pipeline in the background. It stops on its own, or when the room closes.
pub fn spawn_assist_pipeline(room: Arc<Room>, services: RoomServices, request: AssistRequest) -> JoinHandle<()> {
    let token = room.token().child_token();
    tokio::spawn(async move {
        let requester_id = request.requester_id;
        match run_assist_pipeline(&room, &services, request, &token).await {
            Ok(n_deltas) => debug!(
                "Assist pipeline for user {} in room {} finished after {} deltas",
                requester_id,
                room.id(),
                n_deltas
            ),
            Err(e) => error!("Assist pipeline for user {} in room {} failed: {}", requester_id, room.id(), e),
        }
    })
}

/// Run one agent turn and stream its text to the room.
///
/// Returns the number of deltas broadcast. Nothing is broadcast if the
/// requester's active file cannot be read at the room's commit.
pub async fn run_assist_pipeline(
    room: &Room,
    services: &RoomServices,
    request: AssistRequest,
    token: &CancellationToken,
) -> Result<usize, AssistError> {
    if request.active_file.is_empty() {
        return Err(AssistError::NoActiveFile);
    }

    let metadata = room.metadata();
    let scope = RepoScope::new(&services.settings.repo_base_path, metadata);
    let content = services
        .vcs
        .show_file_at_commit(&scope.repo_path, &scope.commit, &request.active_file)
        .await
        .map_err(|source| AssistError::ActiveFile {
            path: request.active_file.clone(),
            source,
        })?;

    let request_id = new_request_id();
    info!(
        "Assist request {} from user {} in room {} (looking at {})",
        request_id,
        request.requester_id,
        room.id(),
        request.active_file
    );

    let turn = TurnRequest {
        system: build_system_prompt(&metadata.files, &request.active_file, &String::from_utf8_lossy(&content)),
        user_text: request.text,
        tools: assist_tool_set(services.vcs.clone(), scope),
    };
    let mut updates = services.llm.stream_turn(turn);

    let server = UserMetadata::server();
    let mut n_deltas = 0;
    loop {
        let update = tokio::select! {
            _ = token.cancelled() => {
                debug!("Assist request {} cancelled", request_id);
                break;
            }
            update = updates.next() => match update {
                Some(update) => update,
                None => break,
            },
        };

        match update {
            AssistUpdate::TextDelta(text) => {
                room.broadcast(server.envelop(LlmDeltaMessage {
                    id: request_id.clone(),
                    content: text,
                }));
                n_deltas += 1;
            }
            AssistUpdate::ToolStart { id, name } => {
                info!("Assist request {}: starting tool {} ({})", request_id, name, id);
            }
            AssistUpdate::ToolDone { id, name, output } => {
                if output.is_error {
                    warn!("Assist request {}: tool {} ({}) failed: {}", request_id, name, id, output.content);
                } else {
                    info!("Assist request {}: tool {} ({}) finished", request_id, name, id);
                }
            }
            AssistUpdate::Error(message) => return Err(AssistError::Model(message)),
        }
    }

    Ok(n_deltas)
}
