use super::{interpret_frames, DeltaStream, FrameInterpreter, StreamProtocolAdapter};
use crate::sse::{FrameMode, SseFrame, StreamedResponse};
use crate::streaming::StreamConfig;
use crate::types::*;
use std::collections::BTreeMap;
use uuid::Uuid;

/// --- PROVIDER WIRE TYPES ---

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    pub finish_reason: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct ChunkDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ProviderToolCallDelta>>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct ProviderToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<RawFunction>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct RawFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
pub struct ProviderError {
    pub error: ProviderErrorDetails,
}

#[derive(serde::Deserialize, Debug)]
pub struct ProviderErrorDetails {
    pub message: String,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Per-session state: the synthesized message id and the index -> id map for
/// tool calls whose follow-up chunks omit the id.
#[derive(Debug)]
struct OpenAiSession {
    message_id: String,
    message_started: bool,
    tool_index_map: BTreeMap<u32, String>,
}

impl OpenAiSession {
    fn new() -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            message_started: false,
            tool_index_map: BTreeMap::new(),
        }
    }

    fn chunk_deltas(&mut self, chunk: ChatCompletionChunk) -> Vec<Delta> {
        let mut out = Vec::new();
        let choice = match chunk.choices.into_iter().next() {
            Some(c) => c,
            None => return out,
        };
        let delta = match choice.delta {
            Some(d) => d,
            None => return out,
        };

        let has_content = match delta.content.as_deref() {
            Some(c) => !c.is_empty(),
            None => false,
        };

        if !self.message_started && (has_content || delta.role.is_some()) {
            self.message_started = true;
            out.push(Delta::MessageStart {
                message_id: self.message_id.clone(),
            });
        }

        if let Some(content) = delta.content {
            if !content.is_empty() {
                out.push(Delta::TextContent { delta: content });
            }
        }

        if let Some(tool_deltas) = delta.tool_calls {
            self.push_tool_call_deltas(&mut out, tool_deltas);
        }

        match choice.finish_reason.as_deref() {
            Some("stop") => out.push(Delta::TextEnd),
            Some("tool_calls") => {
                for id in self.tool_index_map.values() {
                    out.push(Delta::ToolCallEnd {
                        tool_call_id: id.clone(),
                    });
                }
            }
            _ => {}
        }
        out
    }

    fn push_tool_call_deltas(&mut self, out: &mut Vec<Delta>, tool_deltas: Vec<ProviderToolCallDelta>) {
        for td in tool_deltas {
            let (name, arguments) = match td.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };

            // Follow-up chunks from some servers repeat the call with an empty id.
            if let Some(id) = td.id.filter(|id| !id.is_empty()) {
                self.tool_index_map.insert(td.index, id.clone());
                out.push(Delta::ToolCallStart {
                    tool_call_id: id,
                    name: name.unwrap_or_default(),
                });
            }

            let arguments = match arguments {
                Some(a) if !a.is_empty() => a,
                _ => continue,
            };
            match self.tool_index_map.get(&td.index) {
                Some(id) => out.push(Delta::ToolCallArgs {
                    tool_call_id: id.clone(),
                    delta: arguments,
                }),
                None => tracing::debug!(
                    "[ADAPTER] Dropping tool_call args for unmapped index {} ({} chars)",
                    td.index,
                    arguments.len()
                ),
            }
        }
    }
}

impl FrameInterpreter for OpenAiSession {
    fn interpret(&mut self, frame: &SseFrame) -> Result<Vec<Delta>> {
        let data = frame.data.as_str();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        // Error first: it is the more specific shape (requires an "error" key)
        if let Ok(err) = serde_json::from_str::<ProviderError>(data) {
            return Ok(vec![Delta::RunError {
                message: err.error.message,
                code: err.error.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            }]);
        }
        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => Ok(self.chunk_deltas(chunk)),
            Err(e) => {
                tracing::warn!(
                    "[ADAPTER] Failed to parse OpenAI SSE event ({}): {}",
                    e,
                    frame.snippet()
                );
                Ok(Vec::new())
            }
        }
    }
}

/// OpenAI chat-completion chunks (`choices[0].delta`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl StreamProtocolAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn parse(&self, response: StreamedResponse, config: &StreamConfig) -> Result<DeltaStream> {
        interpret_frames(response, FrameMode::DataLines, config, OpenAiSession::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(session: &mut OpenAiSession, data: &str) -> Vec<Delta> {
        match session.interpret(&SseFrame::data(data)) {
            Ok(d) => d,
            Err(e) => panic!("interpret failed: {}", e),
        }
    }

    #[test]
    fn test_text_emits_message_start_once() {
        let mut session = OpenAiSession::new();
        let id = session.message_id.clone();
        let first = feed(
            &mut session,
            r#"{"choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#,
        );
        assert_eq!(
            first,
            vec![
                Delta::MessageStart {
                    message_id: id.clone()
                },
                Delta::TextContent { delta: "Hel".into() },
            ]
        );
        let second = feed(&mut session, r#"{"choices":[{"delta":{"content":"lo"}}]}"#);
        assert_eq!(second, vec![Delta::TextContent { delta: "lo".into() }]);
    }

    #[test]
    fn test_tool_call_args_resolved_via_index() {
        let mut session = OpenAiSession::new();
        let start = feed(
            &mut session,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"tc1","function":{"name":"f"}}]}}]}"#,
        );
        assert_eq!(
            start,
            vec![Delta::ToolCallStart {
                tool_call_id: "tc1".into(),
                name: "f".into()
            }]
        );
        let args = feed(
            &mut session,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{}"}}]}}]}"#,
        );
        assert_eq!(
            args,
            vec![Delta::ToolCallArgs {
                tool_call_id: "tc1".into(),
                delta: "{}".into()
            }]
        );
    }

    #[test]
    fn test_unmapped_index_dropped() {
        let mut session = OpenAiSession::new();
        let out = feed(
            &mut session,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":3,"function":{"arguments":"{\"a\""}}]}}]}"#,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_finish_reasons() {
        let mut session = OpenAiSession::new();
        feed(
            &mut session,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"x","arguments":""}},{"index":1,"id":"b","function":{"name":"y"}}]}}]}"#,
        );
        let end = feed(
            &mut session,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(
            end,
            vec![
                Delta::ToolCallEnd {
                    tool_call_id: "a".into()
                },
                Delta::ToolCallEnd {
                    tool_call_id: "b".into()
                },
            ]
        );
        let stop = feed(&mut session, r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert_eq!(stop, vec![Delta::TextEnd]);
    }

    #[test]
    fn test_provider_error_becomes_run_error() {
        let mut session = OpenAiSession::new();
        let out = feed(&mut session, r#"{"error":{"message":"Overloaded","code":503}}"#);
        assert_eq!(
            out,
            vec![Delta::RunError {
                message: "Overloaded".into(),
                code: Some("503".into())
            }]
        );
    }

    #[test]
    fn test_malformed_chunk_skipped() {
        let mut session = OpenAiSession::new();
        assert!(feed(&mut session, "{bad json").is_empty());
        assert!(feed(&mut session, r#"{"choices":[]}"#).is_empty());
    }
}
