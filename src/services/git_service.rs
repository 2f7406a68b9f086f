use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("git output is not valid UTF-8")]
    InvalidOutput,
}

/// Version-control operations a room needs from its repository.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError>;
    async fn pull(&self, repo: &Path) -> Result<(), GitError>;
    async fn current_commit(&self, repo: &Path) -> Result<String, GitError>;
    async fn list_files(&self, repo: &Path) -> Result<Vec<String>, GitError>;
    async fn show_file_at_commit(&self, repo: &Path, commit: &str, file: &str) -> Result<Vec<u8>, GitError>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
}

impl GitCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, repo: Option<&Path>, args: &[&str]) -> Result<Output, GitError> {
        let mut cmd = Command::new(&self.binary);
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args)
            // Never block on a credential prompt for private remotes.
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        debug!("Running git {:?} in {:?}", args, repo);
        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("git {} failed: {}", args.join(" "), stderr);
            return Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr,
            });
        }
        Ok(output)
    }

    async fn run_text(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(Some(repo), args).await?;
        String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput)
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", "--", url, &dest]).await?;
        Ok(())
    }

    async fn pull(&self, repo: &Path) -> Result<(), GitError> {
        self.run(Some(repo), &["pull", "--ff-only"]).await?;
        Ok(())
    }

    async fn current_commit(&self, repo: &Path) -> Result<String, GitError> {
        let out = self.run_text(repo, &["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn list_files(&self, repo: &Path) -> Result<Vec<String>, GitError> {
        // NUL-separated output is never C-quoted, so non-ASCII paths come back verbatim.
        let out = self.run_text(repo, &["ls-files", "-z"]).await?;
        Ok(out.split('\0').filter(|p| !p.is_empty()).map(str::to_string).collect())
    }

    async fn show_file_at_commit(&self, repo: &Path, commit: &str, file: &str) -> Result<Vec<u8>, GitError> {
        let spec = format!("{}:{}", commit, file);
        let output = self.run(Some(repo), &["show", &spec]).await?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git_available() -> bool {
        StdCommand::new("git").arg("--version").output().is_ok()
    }

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = StdCommand::new("git")
                .arg("-C")
                .arg(dir)
                .args(args)
                .env("GIT_AUTHOR_NAME", "test")
                .env("GIT_AUTHOR_EMAIL", "test@example.com")
                .env("GIT_COMMITTER_NAME", "test")
                .env("GIT_COMMITTER_EMAIL", "test@example.com")
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("README.md"), "# demo\n").unwrap();
        std::fs::write(dir.join("src/lib.rs"), "pub fn demo() {}\n").unwrap();
        std::fs::write(dir.join("café.txt"), "crème\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial"]);
    }

    #[tokio::test]
    async fn test_git_cli_reads_local_repository() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = GitCli::new("git");

        let commit = git.current_commit(dir.path()).await.unwrap();
        assert_eq!(commit.len(), 40);

        let files = git.list_files(dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec!["README.md".to_string(), "café.txt".to_string(), "src/lib.rs".to_string()]
        );

        // Listed names are usable as-is for reads.
        let content = git.show_file_at_commit(dir.path(), &commit, &files[1]).await.unwrap();
        assert_eq!(content, "crème\n".as_bytes());

        let content = git.show_file_at_commit(dir.path(), &commit, "src/lib.rs").await.unwrap();
        assert_eq!(content, b"pub fn demo() {}\n");

        // Working tree edits do not leak into reads pinned to a commit.
        std::fs::write(dir.path().join("src/lib.rs"), "changed\n").unwrap();
        let content = git.show_file_at_commit(dir.path(), &commit, "src/lib.rs").await.unwrap();
        assert_eq!(content, b"pub fn demo() {}\n");
    }

    #[tokio::test]
    async fn test_git_cli_clone_from_local_path() {
        if !git_available() {
            return;
        }
        let src = tempfile::tempdir().unwrap();
        init_repo(src.path());
        let dest_root = tempfile::tempdir().unwrap();
        let dest = dest_root.path().join("clone");
        let git = GitCli::new("git");

        git.clone_repo(&src.path().to_string_lossy(), &dest).await.unwrap();
        git.pull(&dest).await.unwrap();
        assert_eq!(
            git.current_commit(&dest).await.unwrap(),
            git.current_commit(src.path()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_git_cli_missing_file_is_an_error() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = GitCli::new("git");
        let commit = git.current_commit(dir.path()).await.unwrap();

        let err = git.show_file_at_commit(dir.path(), &commit, "nope.txt").await.unwrap_err();
        assert!(matches!(err, GitError::CommandFailed { .. }));
    }
}
