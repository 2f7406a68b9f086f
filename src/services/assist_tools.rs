use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::clients::llm_client::{Tool, ToolOutput, ToolSet};
use crate::services::git_service::VersionControl;
use crate::services::repo_service::RepoScope;

pub const READ_FILE_TOOL: &str = "read_file";
pub const SUBMIT_SOLUTION_TOOL: &str = "submit_solution";

/// Tools offered to the model for one assist turn, bound to a single room.
pub fn assist_tool_set(vcs: Arc<dyn VersionControl>, scope: RepoScope) -> ToolSet {
    ToolSet::new(vec![
        Arc::new(ReadFileTool::new(vcs, scope)),
        Arc::new(SubmitSolutionTool),
    ])
}

/// Reads a file from the room's repository at the room's commit.
pub struct ReadFileTool {
    vcs: Arc<dyn VersionControl>,
    scope: RepoScope,
}

impl ReadFileTool {
    pub fn new(vcs: Arc<dyn VersionControl>, scope: RepoScope) -> Self {
        Self { vcs, scope }
    }
}

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
}

/// Repository-relative, no `..`, no root.
fn is_repo_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE_TOOL
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let params: ReadFileInput = match serde_json::from_value(input) {
            Ok(params) => params,
            Err(e) => return ToolOutput::error(format!("Invalid input: {}", e)),
        };

        if !is_repo_relative(&params.path) {
            return ToolOutput::error(format!("{}: path must be relative to the repository root", params.path));
        }

        match self
            .vcs
            .show_file_at_commit(&self.scope.repo_path, &self.scope.commit, &params.path)
            .await
        {
            Ok(bytes) => ToolOutput::success(json!({ "contents": String::from_utf8_lossy(&bytes) })),
            Err(e) => ToolOutput::error(format!("{}: error reading file: {}", params.path, e)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: String,
    pub content: String,
}

#[derive(Deserialize)]
struct SubmitSolutionInput {
    commit_message: String,
    #[serde(default)]
    files_to_update: Vec<FileUpdate>,
}

/// Terminal tool. Echoes the proposed change; nothing is committed.
pub struct SubmitSolutionTool;

#[async_trait]
impl Tool for SubmitSolutionTool {
    fn name(&self) -> &str {
        SUBMIT_SOLUTION_TOOL
    }

    fn description(&self) -> &str {
        "Submit the solution to the user's request"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["commit_message", "files_to_update"],
            "properties": {
                "commit_message": {
                    "type": "string",
                    "description": "The commit message to use for the solution"
                },
                "files_to_update": {
                    "type": "array",
                    "description": "A list of files to update",
                    "items": {
                        "type": "object",
                        "required": ["path", "content"],
                        "properties": {
                            "path": { "type": "string" },
                            "content": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let params: SubmitSolutionInput = match serde_json::from_value(input) {
            Ok(params) => params,
            Err(e) => return ToolOutput::error(format!("Invalid input: {}", e)),
        };
        info!(
            "Solution submitted: {:?} ({} file(s))",
            params.commit_message,
            params.files_to_update.len()
        );
        ToolOutput::success(json!({
            "commit_message": params.commit_message,
            "files": params.files_to_update,
        }))
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeVcs;
    use std::path::PathBuf;

    fn scope() -> RepoScope {
        RepoScope {
            repo_path: PathBuf::from("/repos/hash"),
            commit: "c0ffee".to_string(),
        }
    }

    #[tokio::test]
    async fn test_read_file_returns_contents() {
        let vcs = Arc::new(FakeVcs::new("c0ffee", &[("src/lib.rs", "pub fn a() {}")]));
        let tools = assist_tool_set(vcs, scope());

        let out = tools.call(READ_FILE_TOOL, json!({"path": "src/lib.rs"})).await;
        assert!(!out.is_error);
        let value: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(value["contents"], "pub fn a() {}");
    }

    #[tokio::test]
    async fn test_read_file_reports_missing_file() {
        let vcs = Arc::new(FakeVcs::new("c0ffee", &[]));
        let out = ReadFileTool::new(vcs, scope()).execute(json!({"path": "nope.rs"})).await;
        assert!(out.is_error);
        assert!(out.content.starts_with("nope.rs: error reading file"));
    }

    #[tokio::test]
    async fn test_read_file_rejects_escaping_paths() {
        let vcs = Arc::new(FakeVcs::new("c0ffee", &[("a.txt", "a")]));
        let tool = ReadFileTool::new(vcs, scope());
        for path in ["../other/a.txt", "/etc/passwd", ""] {
            let out = tool.execute(json!({ "path": path })).await;
            assert!(out.is_error, "{} should be rejected", path);
        }
    }

    #[tokio::test]
    async fn test_read_file_is_pinned_to_scope_commit() {
        let vcs = Arc::new(FakeVcs::new("c0ffee", &[("a.txt", "a")]));
        let stale = RepoScope {
            commit: "0ld".to_string(),
            ..scope()
        };
        let out = ReadFileTool::new(vcs, stale).execute(json!({"path": "a.txt"})).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn test_submit_solution_echoes_proposal() {
        let tools = assist_tool_set(Arc::new(FakeVcs::new("c0ffee", &[])), scope());
        assert!(tools.is_terminal(SUBMIT_SOLUTION_TOOL));
        assert!(!tools.is_terminal(READ_FILE_TOOL));

        let out = tools
            .call(
                SUBMIT_SOLUTION_TOOL,
                json!({
                    "commit_message": "Fix typo",
                    "files_to_update": [{"path": "README.md", "content": "# Fixed\n"}]
                }),
            )
            .await;
        assert!(!out.is_error);
        let value: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(value["commit_message"], "Fix typo");
        assert_eq!(value["files"][0]["path"], "README.md");
    }

    #[test]
    fn test_tool_definitions() {
        let tools = assist_tool_set(Arc::new(FakeVcs::new("c0ffee", &[])), scope());
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["read_file", "submit_solution"]);
    }
}
