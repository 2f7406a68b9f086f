use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::llm_client::{AssistUpdate, LanguageModel, LlmError, ToolDefinition, TurnRequest, UpdateStream};

const API_VERSION: &str = "2023-06-01";

/// Upper bound on request/tool round trips within one turn.
const MAX_ROUNDS: usize = 8;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_url: String, api_key: String, model: String, max_tokens: u32) -> Result<Self, LlmError> {
        // No overall timeout: a streamed turn may legitimately run for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model,
            max_tokens,
        })
    }
}

impl LanguageModel for AnthropicClient {
    fn stream_turn(&self, request: TurnRequest) -> UpdateStream {
        let (tx, rx) = mpsc::channel::<AssistUpdate>(100);
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = this.drive_turn(request, &tx).await {
                let _ = tx.send(AssistUpdate::Error(e.to_string())).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

impl AnthropicClient {
    async fn drive_turn(&self, request: TurnRequest, tx: &mpsc::Sender<AssistUpdate>) -> Result<(), LlmError> {
        let tools: Vec<ApiTool> = request.tools.definitions().into_iter().map(ApiTool::from).collect();
        let mut messages = vec![ApiMessage {
            role: "user",
            content: vec![ApiContent::Text { text: request.user_text.clone() }],
        }];

        for round in 0..MAX_ROUNDS {
            if tx.is_closed() {
                debug!("Update stream dropped, abandoning turn before round {}", round + 1);
                return Ok(());
            }

            let api_request = ApiRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                system: &request.system,
                messages: &messages,
                tools: &tools,
                stream: true,
            };

            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("accept", "text/event-stream")
                .json(&api_request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api { status, body });
            }

            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut turn = TurnAccumulator::default();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                buffer.extend_from_slice(&chunk);

                while let Some(event) = parse_sse_event(&mut buffer) {
                    if let Some(text) = turn.apply(&event)? {
                        if tx.send(AssistUpdate::TextDelta(text)).await.is_err() {
                            // Receiver dropped, nobody is listening anymore.
                            return Ok(());
                        }
                    }
                }
            }

            let (assistant, tool_uses) = turn.finish();
            if tool_uses.is_empty() {
                debug!("Model turn finished after {} round(s)", round + 1);
                return Ok(());
            }
            messages.push(assistant);

            let mut results = Vec::with_capacity(tool_uses.len());
            let mut submitted = false;
            for tool_use in tool_uses {
                if tx
                    .send(AssistUpdate::ToolStart { id: tool_use.id.clone(), name: tool_use.name.clone() })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
                let output = request.tools.call(&tool_use.name, tool_use.input).await;
                submitted |= request.tools.is_terminal(&tool_use.name);
                results.push(ApiContent::ToolResult {
                    tool_use_id: tool_use.id.clone(),
                    content: output.content.clone(),
                    is_error: output.is_error,
                });
                if tx
                    .send(AssistUpdate::ToolDone { id: tool_use.id, name: tool_use.name, output })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }

            if submitted {
                info!("Model submitted its solution");
                return Ok(());
            }
            messages.push(ApiMessage { role: "user", content: results });
        }

        warn!("Model turn stopped after {} rounds without submitting", MAX_ROUNDS);
        Ok(())
    }
}

/// SSE event from the stream
#[derive(Debug, PartialEq)]
struct SseEvent {
    event_type: String,
    data: String,
}

/// Pop one complete SSE event off the front of the buffer.
///
/// The buffer holds raw bytes so a character split across network chunks is
/// only decoded once the whole event has arrived.
fn parse_sse_event(buffer: &mut Vec<u8>) -> Option<SseEvent> {
    loop {
        let event_end = buffer.windows(2).position(|w| w == b"\n\n")?;
        let raw: Vec<u8> = buffer.drain(..event_end + 2).collect();
        let event_str = String::from_utf8_lossy(&raw);

        let mut event_type = String::new();
        let mut data = String::new();
        for line in event_str.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix("event:") {
                event_type = rest.trim_start().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim_start());
            }
        }

        if !event_type.is_empty() || !data.is_empty() {
            return Some(SseEvent { event_type, data });
        }
    }
}

struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

struct CompletedToolUse {
    id: String,
    name: String,
    input: Value,
}

enum Block {
    Text(String),
    ToolUse(PendingToolUse),
}

/// Rebuilds the assistant message of one round from stream events.
#[derive(Default)]
struct TurnAccumulator {
    blocks: BTreeMap<usize, Block>,
    stop_reason: Option<String>,
}

impl TurnAccumulator {
    /// Apply one event; returns text to forward immediately, if any.
    fn apply(&mut self, event: &SseEvent) -> Result<Option<String>, LlmError> {
        match event.event_type.as_str() {
            "content_block_start" => {
                if let Ok(parsed) = serde_json::from_str::<ContentBlockStartEvent>(&event.data) {
                    let block = match parsed.content_block {
                        ApiContentBlockStart::Text { text } => Block::Text(text),
                        ApiContentBlockStart::ToolUse { id, name } => Block::ToolUse(PendingToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        }),
                        ApiContentBlockStart::Other => return Ok(None),
                    };
                    self.blocks.insert(parsed.index, block);
                }
            }
            "content_block_delta" => {
                if let Ok(parsed) = serde_json::from_str::<ContentBlockDeltaEvent>(&event.data) {
                    match (parsed.delta, self.blocks.get_mut(&parsed.index)) {
                        (ApiDelta::TextDelta { text }, Some(Block::Text(acc))) => {
                            acc.push_str(&text);
                            return Ok(Some(text));
                        }
                        (ApiDelta::TextDelta { text }, None) => return Ok(Some(text)),
                        (ApiDelta::InputJsonDelta { partial_json }, Some(Block::ToolUse(tool))) => {
                            tool.input_json.push_str(&partial_json);
                        }
                        _ => {}
                    }
                }
            }
            "message_delta" => {
                if let Ok(parsed) = serde_json::from_str::<MessageDeltaEvent>(&event.data) {
                    if let Some(stop_reason) = parsed.delta.stop_reason {
                        self.stop_reason = Some(stop_reason);
                    }
                }
            }
            "error" => return Err(LlmError::Stream(event.data.clone())),
            // message_start, content_block_stop, message_stop, ping
            _ => {}
        }
        Ok(None)
    }

    /// The assistant message to replay, and the tool calls to run when the
    /// model stopped to use tools.
    fn finish(self) -> (ApiMessage, Vec<CompletedToolUse>) {
        let wants_tools = self.stop_reason.as_deref() == Some("tool_use");
        let mut content = Vec::new();
        let mut tool_uses = Vec::new();

        for block in self.blocks.into_values() {
            match block {
                Block::Text(text) if !text.is_empty() => content.push(ApiContent::Text { text }),
                Block::Text(_) => {}
                Block::ToolUse(tool) => {
                    let input = if tool.input_json.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&tool.input_json).unwrap_or_else(|e| {
                            warn!("Invalid input JSON for tool '{}': {}", tool.name, e);
                            Value::Object(Default::default())
                        })
                    };
                    content.push(ApiContent::ToolUse {
                        id: tool.id.clone(),
                        name: tool.name.clone(),
                        input: input.clone(),
                    });
                    tool_uses.push(CompletedToolUse { id: tool.id, name: tool.name, input });
                }
            }
        }

        if !wants_tools {
            tool_uses.clear();
        }
        (ApiMessage { role: "assistant", content }, tool_uses)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ApiTool],
    stream: bool,
}

fn no_tools(tools: &&[ApiTool]) -> bool {
    tools.is_empty()
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContent>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

impl From<ToolDefinition> for ApiTool {
    fn from(def: ToolDefinition) -> Self {
        Self {
            name: def.name,
            description: def.description,
            input_schema: def.input_schema,
        }
    }
}

#[derive(Deserialize)]
struct ContentBlockStartEvent {
    index: usize,
    content_block: ApiContentBlockStart,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentBlockDeltaEvent {
    index: usize,
    delta: ApiDelta,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
}

#[derive(Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}
