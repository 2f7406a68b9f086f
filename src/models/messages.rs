use serde::{Deserialize, Serialize};

/// Identity of the server when it speaks in a room (AI deltas).
pub const SERVER_USER_ID: u32 = 0;
pub const SERVER_USER_NAME: &str = "Server";

/// Name given to a participant who clears their display name.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Per-participant state. Mutated only by the owning room loop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub id: u32,
    pub name: String,
    pub active_file: String,
}

impl UserMetadata {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active_file: String::new(),
        }
    }

    pub fn server() -> Self {
        Self::new(SERVER_USER_ID, SERVER_USER_NAME)
    }

    /// Wrap a message with this user as sender.
    pub fn envelop(&self, message: impl Into<Message>) -> Envelope {
        Envelope {
            sender: self.clone(),
            message: message.into(),
        }
    }
}

/// Trim a requested display name, falling back to [`ANONYMOUS_NAME`].
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        ANONYMOUS_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub user: UserMetadata,
}

/// Empty on the wire; who left is carried by the envelope sender.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveMessage {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LlmDeltaMessage {
    pub id: String,
    pub content: String,
}

/// Partial metadata update. An absent field is left untouched, which is
/// not the same as a field set to the empty string.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetadataMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    pub users: Vec<UserMetadata>,
    pub repo_hash: String,
    pub current_commit: String,
    pub files: Vec<String>,
}

/// Every message that travels between clients and a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Chat(ChatMessage),
    Join(JoinMessage),
    Leave(LeaveMessage),
    LlmDelta(LlmDeltaMessage),
    UpdateMetadata(UpdateMetadataMessage),
    Welcome(WelcomeMessage),
}

impl Message {
    pub const CHAT: &'static str = "chat";
    pub const JOIN: &'static str = "join";
    pub const LEAVE: &'static str = "leave";
    pub const LLM_DELTA: &'static str = "llmDelta";
    pub const UPDATE_METADATA: &'static str = "updateMetadata";
    pub const WELCOME: &'static str = "welcome";

    /// Wire tag of this variant.
    pub fn discriminator(&self) -> &'static str {
        match self {
            Message::Chat(_) => Self::CHAT,
            Message::Join(_) => Self::JOIN,
            Message::Leave(_) => Self::LEAVE,
            Message::LlmDelta(_) => Self::LLM_DELTA,
            Message::UpdateMetadata(_) => Self::UPDATE_METADATA,
            Message::Welcome(_) => Self::WELCOME,
        }
    }

    /// JSON payload of this variant, without the discriminator.
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            Message::Chat(m) => serde_json::to_string(m),
            Message::Join(m) => serde_json::to_string(m),
            Message::Leave(m) => serde_json::to_string(m),
            Message::LlmDelta(m) => serde_json::to_string(m),
            Message::UpdateMetadata(m) => serde_json::to_string(m),
            Message::Welcome(m) => serde_json::to_string(m),
        }
    }
}

impl From<ChatMessage> for Message {
    fn from(m: ChatMessage) -> Self {
        Message::Chat(m)
    }
}

impl From<JoinMessage> for Message {
    fn from(m: JoinMessage) -> Self {
        Message::Join(m)
    }
}

impl From<LeaveMessage> for Message {
    fn from(m: LeaveMessage) -> Self {
        Message::Leave(m)
    }
}

impl From<LlmDeltaMessage> for Message {
    fn from(m: LlmDeltaMessage) -> Self {
        Message::LlmDelta(m)
    }
}

impl From<UpdateMetadataMessage> for Message {
    fn from(m: UpdateMetadataMessage) -> Self {
        Message::UpdateMetadata(m)
    }
}

impl From<WelcomeMessage> for Message {
    fn from(m: WelcomeMessage) -> Self {
        Message::Welcome(m)
    }
}

/// A message paired with the participant it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: UserMetadata,
    pub message: Message,
}
