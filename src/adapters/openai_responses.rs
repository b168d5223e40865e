use super::{interpret_frames, DeltaStream, FrameInterpreter, StreamProtocolAdapter};
use crate::sse::{FrameMode, SseFrame, StreamedResponse};
use crate::streaming::StreamConfig;
use crate::types::*;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {},
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone { item_id: String },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: Option<FailedResponse>,
    },
    // response.created, response.in_progress, response.completed, content_part.*, ...
    #[serde(other)]
    Lifecycle,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum OutputItem {
    #[serde(rename = "message")]
    Message {
        id: String,
        #[serde(default)]
        role: Option<String>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct FailedResponse {
    #[serde(default)]
    error: Option<FailedError>,
}

#[derive(Debug, Deserialize)]
struct FailedError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Per-session item_id -> call_id map; argument events reference the item, not the call.
#[derive(Debug, Default)]
struct ResponsesSession {
    item_to_call: HashMap<String, String>,
}

impl ResponsesSession {
    fn call_id(&self, item_id: String) -> String {
        match self.item_to_call.get(&item_id) {
            Some(call_id) => call_id.clone(),
            None => item_id,
        }
    }

    fn event_deltas(&mut self, event: ResponsesEvent) -> Vec<Delta> {
        match event {
            ResponsesEvent::OutputItemAdded { item } => match item {
                OutputItem::Message { id, role } if role.as_deref().unwrap_or("assistant") == "assistant" => {
                    vec![Delta::MessageStart { message_id: id }]
                }
                OutputItem::FunctionCall { id, call_id, name } => {
                    let item_id = match id {
                        Some(id) => id,
                        None => call_id.clone(),
                    };
                    self.item_to_call.insert(item_id, call_id.clone());
                    vec![Delta::ToolCallStart {
                        tool_call_id: call_id,
                        name,
                    }]
                }
                _ => Vec::new(),
            },
            ResponsesEvent::OutputTextDelta { delta } => vec![Delta::TextContent { delta }],
            ResponsesEvent::OutputTextDone {} => vec![Delta::TextEnd],
            ResponsesEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                vec![Delta::ToolCallArgs {
                    tool_call_id: self.call_id(item_id),
                    delta,
                }]
            }
            ResponsesEvent::FunctionCallArgumentsDone { item_id } => vec![Delta::ToolCallEnd {
                tool_call_id: self.call_id(item_id),
            }],
            ResponsesEvent::Error { message, code } => vec![Delta::RunError { message, code }],
            ResponsesEvent::Failed { response } => {
                let error = response.and_then(|r| r.error);
                let (message, code) = match error {
                    Some(e) => (e.message, e.code),
                    None => (None, None),
                };
                vec![Delta::RunError {
                    message: message.unwrap_or_else(|| "Response failed".to_string()),
                    code,
                }]
            }
            ResponsesEvent::Lifecycle => Vec::new(),
        }
    }
}

impl FrameInterpreter for ResponsesSession {
    fn interpret(&mut self, frame: &SseFrame) -> Result<Vec<Delta>> {
        if frame.data.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<ResponsesEvent>(&frame.data) {
            Ok(event) => Ok(self.event_deltas(event)),
            Err(e) => {
                tracing::warn!(
                    "[ADAPTER] Failed to parse OpenAI Responses SSE event ({}): {}",
                    e,
                    frame.snippet()
                );
                Ok(Vec::new())
            }
        }
    }
}

/// OpenAI Responses API stream events.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesAdapter;

impl StreamProtocolAdapter for OpenAiResponsesAdapter {
    fn name(&self) -> &'static str {
        "openai-responses"
    }

    fn parse(&self, response: StreamedResponse, config: &StreamConfig) -> Result<DeltaStream> {
        interpret_frames(
            response,
            FrameMode::DataLines,
            config,
            ResponsesSession::default(),
        )
    }
}
