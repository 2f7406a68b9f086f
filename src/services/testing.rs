//! In-memory doubles for the version-control and language-model seams.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::clients::llm_client::{AssistUpdate, LanguageModel, TurnRequest, UpdateStream};
use crate::services::git_service::{GitError, VersionControl};
use crate::ws::room::{RoomServices, RoomSettings};

/// Services with small queues and no idle teardown.
pub fn room_services(vcs: Arc<FakeVcs>, llm: Arc<ScriptedModel>) -> RoomServices {
    room_services_with(vcs, llm, None)
}

pub fn room_services_with(vcs: Arc<FakeVcs>, llm: Arc<ScriptedModel>, idle_timeout: Option<Duration>) -> RoomServices {
    RoomServices {
        vcs,
        llm,
        settings: Arc::new(RoomSettings {
            repo_base_path: PathBuf::from("/tmp/gittyup-test-repos"),
            event_capacity: 32,
            outbound_capacity: 32,
            idle_timeout,
        }),
    }
}

pub struct FakeVcs {
    commit: String,
    files: BTreeMap<String, String>,
    fail_clone: bool,
    clone_delay: Duration,
    clones: AtomicUsize,
    pulls: AtomicUsize,
}

impl FakeVcs {
    pub fn new(commit: &str, files: &[(&str, &str)]) -> Self {
        Self {
            commit: commit.to_string(),
            files: files.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect(),
            fail_clone: false,
            clone_delay: Duration::ZERO,
            clones: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub fn with_clone_delay(mut self, delay: Duration) -> Self {
        self.clone_delay = delay;
        self
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<(), GitError> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.clone_delay).await;
        std::fs::create_dir_all(dest)?;
        if self.fail_clone {
            return Err(GitError::CommandFailed {
                command: "clone".to_string(),
                stderr: "repository not found".to_string(),
            });
        }
        Ok(())
    }

    async fn pull(&self, _repo: &Path) -> Result<(), GitError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_commit(&self, _repo: &Path) -> Result<String, GitError> {
        Ok(self.commit.clone())
    }

    async fn list_files(&self, _repo: &Path) -> Result<Vec<String>, GitError> {
        Ok(self.files.keys().cloned().collect())
    }

    async fn show_file_at_commit(&self, _repo: &Path, commit: &str, file: &str) -> Result<Vec<u8>, GitError> {
        if commit != self.commit {
            return Err(GitError::CommandFailed {
                command: "show".to_string(),
                stderr: format!("invalid object name '{}'", commit),
            });
        }
        self.files
            .get(file)
            .map(|c| c.as_bytes().to_vec())
            .ok_or_else(|| GitError::CommandFailed {
                command: "show".to_string(),
                stderr: format!("path '{}' does not exist in '{}'", file, commit),
            })
    }
}

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Text(&'static str),
    CallTool(&'static str, Value),
    Fail(&'static str),
    Pause(Duration),
}

/// Plays back a fixed script for every turn, running tool calls for real.
pub struct ScriptedModel {
    script: Vec<ScriptStep>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// (system, user_text) of every turn started so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn stream_turn(&self, request: TurnRequest) -> UpdateStream {
        self.requests
            .lock()
            .unwrap()
            .push((request.system.clone(), request.user_text.clone()));

        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        tokio::spawn(async move {
            for (i, step) in script.into_iter().enumerate() {
                match step {
                    ScriptStep::Text(text) => {
                        let _ = tx.send(AssistUpdate::TextDelta(text.to_string())).await;
                    }
                    ScriptStep::CallTool(name, input) => {
                        let id = format!("toolu_{}", i);
                        let _ = tx.send(AssistUpdate::ToolStart { id: id.clone(), name: name.to_string() }).await;
                        let output = request.tools.call(name, input).await;
                        let _ = tx.send(AssistUpdate::ToolDone { id, name: name.to_string(), output }).await;
                    }
                    ScriptStep::Fail(message) => {
                        let _ = tx.send(AssistUpdate::Error(message.to_string())).await;
                        return;
                    }
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}
