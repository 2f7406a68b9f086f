use serde::{Deserialize, Serialize};

/// Repository snapshot a room was initialized with.
///
/// Built once per room after a successful sync and shared immutably, so the
/// commit and the file listing always come from the same sync.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    pub clone_url: String,
    pub repo_hash: String,
    pub current_commit: String,
    pub files: Vec<String>,
}
