use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::RoomMetadata;
use crate::services::git_service::{GitError, VersionControl};

#[derive(Debug, Error)]
pub enum RoomInitError {
    #[error("invalid repository identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: GitError,
    },
    #[error("failed to pull {path}: {source}")]
    Pull {
        path: String,
        #[source]
        source: GitError,
    },
    #[error("failed to read repository state: {0}")]
    ReadState(#[source] GitError),
}

/// Deterministic on-disk key for a room: URL-safe base64 of SHA-256.
pub fn hash_room_id(room_id: &str) -> String {
    let digest = Sha256::digest(room_id.as_bytes());
    general_purpose::URL_SAFE.encode(digest)
}

pub fn clone_url_for(room_id: &str) -> String {
    format!("https://{}.git", room_id)
}

/// Whether a string could have been produced by [`hash_room_id`].
pub fn is_valid_repo_hash(repo_hash: &str) -> bool {
    repo_hash.len() == 44
        && repo_hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
}

fn validate_room_id(room_id: &str) -> Result<(), RoomInitError> {
    let invalid = room_id.is_empty()
        || room_id.starts_with('-')
        || room_id.chars().any(|c| c.is_whitespace() || c.is_control());
    if invalid {
        return Err(RoomInitError::InvalidIdentifier(room_id.to_string()));
    }
    Ok(())
}

/// Location of a room's repository plus the commit its reads are pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    pub repo_path: PathBuf,
    pub commit: String,
}

impl RepoScope {
    pub fn new(base_path: &Path, metadata: &RoomMetadata) -> Self {
        Self {
            repo_path: base_path.join(&metadata.repo_hash),
            commit: metadata.current_commit.clone(),
        }
    }
}

/// Clone or pull the repository behind `room_id` and capture its state.
///
/// Either returns a complete [`RoomMetadata`] or an error; a failed clone
/// leaves no directory behind.
pub async fn sync_room_repo(
    vcs: &dyn VersionControl,
    base_path: &Path,
    room_id: &str,
) -> Result<RoomMetadata, RoomInitError> {
    validate_room_id(room_id)?;

    let repo_hash = hash_room_id(room_id);
    let repo_path = base_path.join(&repo_hash);
    let clone_url = clone_url_for(room_id);

    if !repo_path.exists() {
        info!("Cloning {} into {}", clone_url, repo_path.display());
        if let Err(e) = tokio::fs::create_dir_all(base_path).await {
            error!("Failed to create repository base path {}: {}", base_path.display(), e);
            return Err(RoomInitError::Clone { url: clone_url, source: GitError::Spawn(e) });
        }
        if let Err(source) = vcs.clone_repo(&clone_url, &repo_path).await {
            if repo_path.exists() {
                if let Err(e) = tokio::fs::remove_dir_all(&repo_path).await {
                    warn!("Failed to remove partial clone {}: {}", repo_path.display(), e);
                }
            }
            return Err(RoomInitError::Clone { url: clone_url, source });
        }
    } else {
        info!("Pulling latest changes in {}", repo_path.display());
        vcs.pull(&repo_path).await.map_err(|source| RoomInitError::Pull {
            path: repo_path.display().to_string(),
            source,
        })?;
    }

    let current_commit = vcs.current_commit(&repo_path).await.map_err(RoomInitError::ReadState)?;
    let files = vcs.list_files(&repo_path).await.map_err(RoomInitError::ReadState)?;

    info!("Room {} synced at commit {} ({} files)", room_id, current_commit, files.len());
    Ok(RoomMetadata {
        clone_url,
        repo_hash,
        current_commit,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeVcs;

    #[test]
    fn test_hash_room_id_is_stable() {
        let a = hash_room_id("github.com/blixt/go-gittyup");
        let b = hash_room_id("github.com/blixt/go-gittyup");
        assert_eq!(a, b);
        assert_eq!(a, "tI-wEuISJ0roFGAhk8xJ38qYdE8CSHLDbjfOJmh0XWk=");
        assert_ne!(a, hash_room_id("github.com/acme/widgets"));
        assert!(is_valid_repo_hash(&a));
    }

    #[test]
    fn test_is_valid_repo_hash_rejects_paths() {
        assert!(!is_valid_repo_hash(".."));
        assert!(!is_valid_repo_hash("tI-wEuISJ0roFGAhk8xJ38qYdE8CSHLDbjfOJmh0XW/="));
        assert!(is_valid_repo_hash("9g7NsW5ejoKdg0bxmiXiME7Tis6Y8clYzk_TeSwugSY="));
    }

    #[test]
    fn test_clone_url() {
        assert_eq!(clone_url_for("github.com/acme/widgets"), "https://github.com/acme/widgets.git");
    }

    #[tokio::test]
    async fn test_sync_clones_when_missing_then_pulls() {
        let base = tempfile::tempdir().unwrap();
        let vcs = FakeVcs::new("c0ffee", &[("README.md", "hello")]);

        let meta = sync_room_repo(&vcs, base.path(), "github.com/acme/widgets").await.unwrap();
        assert_eq!(meta.repo_hash, hash_room_id("github.com/acme/widgets"));
        assert_eq!(meta.current_commit, "c0ffee");
        assert_eq!(meta.files, vec!["README.md".to_string()]);
        assert_eq!(vcs.clone_count(), 1);
        assert_eq!(vcs.pull_count(), 0);

        sync_room_repo(&vcs, base.path(), "github.com/acme/widgets").await.unwrap();
        assert_eq!(vcs.clone_count(), 1);
        assert_eq!(vcs.pull_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_no_directory() {
        let base = tempfile::tempdir().unwrap();
        let vcs = FakeVcs::new("c0ffee", &[]).failing_clone();

        let err = sync_room_repo(&vcs, base.path(), "github.com/acme/widgets").await.unwrap_err();
        assert!(matches!(err, RoomInitError::Clone { .. }));
        assert!(!base.path().join(hash_room_id("github.com/acme/widgets")).exists());
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_rejected_before_git() {
        let base = tempfile::tempdir().unwrap();
        let vcs = FakeVcs::new("c0ffee", &[]);

        for id in ["", "github.com/a b", "--upload-pack=x"] {
            let err = sync_room_repo(&vcs, base.path(), id).await.unwrap_err();
            assert!(matches!(err, RoomInitError::InvalidIdentifier(_)));
        }
        assert_eq!(vcs.clone_count(), 0);
    }
}
