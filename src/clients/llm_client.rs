use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("stream error: {0}")]
    Stream(String),
}

/// One step of a streamed model turn, in the order the model produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistUpdate {
    TextDelta(String),
    ToolStart { id: String, name: String },
    ToolDone { id: String, name: String, output: ToolOutput },
    Error(String),
}

pub type UpdateStream = BoxStream<'static, AssistUpdate>;

/// Result of a tool call, as reported back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(value: Value) -> Self {
        Self {
            content: value.to_string(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool the model may call during a turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what's sent to the API)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the input parameters
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, input: Value) -> ToolOutput;

    /// Whether calling this tool ends the turn.
    fn is_terminal(&self) -> bool {
        false
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// The fixed set of tools offered for one turn.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.find(name).map(|t| t.is_terminal()).unwrap_or(false)
    }

    pub async fn call(&self, name: &str, input: Value) -> ToolOutput {
        match self.find(name) {
            Some(tool) => tool.execute(input).await,
            None => {
                warn!("Model called unknown tool '{}'", name);
                ToolOutput::error(format!("Unknown tool: {}", name))
            }
        }
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

/// Everything a model needs to run one turn.
#[derive(Clone)]
pub struct TurnRequest {
    pub system: String,
    pub user_text: String,
    pub tools: ToolSet,
}

/// A streaming chat model that dispatches tool calls into a [`ToolSet`].
pub trait LanguageModel: Send + Sync {
    fn stream_turn(&self, request: TurnRequest) -> UpdateStream;
}

/// Stand-in used when no provider credentials are configured.
pub struct UnconfiguredModel;

impl LanguageModel for UnconfiguredModel {
    fn stream_turn(&self, _request: TurnRequest) -> UpdateStream {
        Box::pin(stream::once(async {
            AssistUpdate::Error(LlmError::NotConfigured.to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, input: Value) -> ToolOutput {
            ToolOutput::success(input)
        }
    }

    #[tokio::test]
    async fn test_tool_set_dispatches_by_name() {
        let tools = ToolSet::new(vec![Arc::new(EchoTool)]);
        let out = tools.call("echo", json!({"a": 1})).await;
        assert_eq!(out, ToolOutput::success(json!({"a": 1})));
        assert!(!tools.is_terminal("echo"));

        let out = tools.call("missing", json!({})).await;
        assert!(out.is_error);
        assert_eq!(tools.definitions()[0].name, "echo");
    }

    #[tokio::test]
    async fn test_unconfigured_model_reports_error() {
        let mut updates = UnconfiguredModel.stream_turn(TurnRequest {
            system: String::new(),
            user_text: "hi".to_string(),
            tools: ToolSet::default(),
        });
        assert!(matches!(updates.next().await, Some(AssistUpdate::Error(_))));
        assert!(updates.next().await.is_none());
    }
}
