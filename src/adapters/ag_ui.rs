use super::{interpret_frames, DeltaStream, FrameInterpreter, StreamProtocolAdapter};
use crate::sse::{encode_record, FrameMode, SseFrame, StreamedResponse};
use crate::streaming::StreamConfig;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Generic typed events, one JSON object per `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AgUiEvent {
    TextMessageStart {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    TextMessageContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        delta: String,
    },
    TextMessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    ToolCallStart {
        tool_call_id: String,
        #[serde(default)]
        tool_call_name: String,
    },
    ToolCallArgs {
        tool_call_id: String,
        delta: String,
    },
    ToolCallEnd {
        tool_call_id: String,
    },
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl AgUiEvent {
    pub fn into_delta(self) -> Option<Delta> {
        let delta = match self {
            Self::TextMessageStart { message_id, .. } => Delta::MessageStart { message_id },
            Self::TextMessageContent { delta, .. } => Delta::TextContent { delta },
            Self::TextMessageEnd { .. } => Delta::TextEnd,
            Self::ToolCallStart {
                tool_call_id,
                tool_call_name,
            } => Delta::ToolCallStart {
                tool_call_id,
                name: tool_call_name,
            },
            Self::ToolCallArgs {
                tool_call_id,
                delta,
            } => Delta::ToolCallArgs {
                tool_call_id,
                delta,
            },
            Self::ToolCallEnd { tool_call_id } => Delta::ToolCallEnd { tool_call_id },
            Self::RunError { message, code } => Delta::RunError { message, code },
            Self::Unknown => return None,
        };
        Some(delta)
    }

    /// `data: <json>\n\n`
    pub fn to_sse_string(&self) -> Result<String> {
        Ok(encode_record(None, &serde_json::to_string(self)?))
    }
}

#[derive(Debug, Default)]
struct AgUiInterpreter;

impl FrameInterpreter for AgUiInterpreter {
    fn interpret(&mut self, frame: &SseFrame) -> Result<Vec<Delta>> {
        if frame.data.is_empty() {
            return Ok(Vec::new());
        }
        let event = match serde_json::from_str::<AgUiEvent>(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "[ADAPTER] Failed to parse SSE event ({}): {}",
                    e,
                    frame.snippet()
                );
                return Ok(Vec::new());
            }
        };
        match event.into_delta() {
            Some(delta) => Ok(vec![delta]),
            None => {
                tracing::debug!("[ADAPTER] Unhandled event type: {}", frame.snippet());
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgUiAdapter;

impl StreamProtocolAdapter for AgUiAdapter {
    fn name(&self) -> &'static str {
        "ag-ui"
    }

    fn parse(&self, response: StreamedResponse, config: &StreamConfig) -> Result<DeltaStream> {
        interpret_frames(response, FrameMode::DataLines, config, AgUiInterpreter)
    }
}
