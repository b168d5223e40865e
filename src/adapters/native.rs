use super::{interpret_frames, DeltaStream, FrameInterpreter, StreamProtocolAdapter};
use crate::constants::*;
use crate::sse::{encode_record, FrameMode, SseFrame, StreamedResponse};
use crate::streaming::StreamConfig;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of an `R` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplatePayload {
    pub name: String,
    #[serde(rename = "templateProps", default)]
    pub template_props: Value,
}

/// The five single-letter tagged events.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    TextDelta(String),
    ResponseTemplate(TemplatePayload),
    TemplatePropsDelta(String),
    ContextUpdate(Vec<Value>),
    MessageIdUpdate(String),
}

impl NativeEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::TextDelta(_) => TAG_TEXT_DELTA,
            Self::ResponseTemplate(_) => TAG_RESPONSE_TEMPLATE,
            Self::TemplatePropsDelta(_) => TAG_TEMPLATE_PROPS_STREAM,
            Self::ContextUpdate(_) => TAG_CONTEXT_UPDATE,
            Self::MessageIdUpdate(_) => TAG_MESSAGE_ID_UPDATE,
        }
    }

    /// `Ok(None)` for frames without a known tag. Malformed `R`/`U` payloads are errors.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>> {
        let tag = match frame.event.as_deref() {
            Some(tag) => tag,
            None => return Ok(None),
        };
        let data = &frame.data;
        let event = match tag {
            TAG_TEXT_DELTA => Self::TextDelta(data.clone()),
            TAG_RESPONSE_TEMPLATE => {
                let payload = serde_json::from_str::<TemplatePayload>(data).map_err(|source| {
                    StreamError::FrameParse {
                        tag: tag.to_string(),
                        source,
                    }
                })?;
                Self::ResponseTemplate(payload)
            }
            TAG_TEMPLATE_PROPS_STREAM => Self::TemplatePropsDelta(data.clone()),
            TAG_CONTEXT_UPDATE => {
                let value = serde_json::from_str::<Value>(data).map_err(|source| {
                    StreamError::FrameParse {
                        tag: tag.to_string(),
                        source,
                    }
                })?;
                match value {
                    Value::Array(values) => Self::ContextUpdate(values),
                    other => Self::ContextUpdate(vec![other]),
                }
            }
            TAG_MESSAGE_ID_UPDATE => Self::MessageIdUpdate(data.clone()),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn into_delta(self) -> Delta {
        match self {
            Self::TextDelta(delta) => Delta::TextContent { delta },
            Self::ResponseTemplate(payload) => Delta::ResponseTemplate {
                name: payload.name,
                template_props: payload.template_props,
            },
            Self::TemplatePropsDelta(delta) => Delta::TemplatePropsDelta { delta },
            Self::ContextUpdate(values) => Delta::ContextUpdate { values },
            Self::MessageIdUpdate(message_id) => Delta::MessageStart { message_id },
        }
    }

    pub fn to_sse_string(&self) -> Result<String> {
        let data = match self {
            Self::TextDelta(s) | Self::TemplatePropsDelta(s) | Self::MessageIdUpdate(s) => {
                s.clone()
            }
            Self::ResponseTemplate(payload) => serde_json::to_string(payload)?,
            Self::ContextUpdate(values) => serde_json::to_string(values)?,
        };
        Ok(encode_record(Some(self.tag()), &data))
    }
}

#[derive(Debug, Default)]
struct NativeInterpreter;

impl FrameInterpreter for NativeInterpreter {
    fn interpret(&mut self, frame: &SseFrame) -> Result<Vec<Delta>> {
        match NativeEvent::from_frame(frame)? {
            Some(event) => {
                tracing::trace!("[ADAPTER] native '{}' frame: {}", event.tag(), frame.snippet());
                Ok(vec![event.into_delta()])
            }
            None => {
                tracing::debug!(
                    "[ADAPTER] Ignoring native frame with event {:?}: {}",
                    frame.event,
                    frame.snippet()
                );
                Ok(Vec::new())
            }
        }
    }
}

/// `event: <T|R|C|U|M>` / `data:` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAdapter;

impl StreamProtocolAdapter for NativeAdapter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn parse(&self, response: StreamedResponse, config: &StreamConfig) -> Result<DeltaStream> {
        interpret_frames(response, FrameMode::Records, config, NativeInterpreter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(tag: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(tag.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_tags_map_to_deltas() {
        let cases = vec![
            (frame("T", "hi"), Delta::TextContent { delta: "hi".into() }),
            (
                frame("R", r#"{"name":"card","templateProps":{"a":1}}"#),
                Delta::ResponseTemplate {
                    name: "card".into(),
                    template_props: json!({"a": 1}),
                },
            ),
            (
                frame("C", "more"),
                Delta::TemplatePropsDelta {
                    delta: "more".into(),
                },
            ),
            (
                frame("U", r#"[{"k":1},2]"#),
                Delta::ContextUpdate {
                    values: vec![json!({"k": 1}), json!(2)],
                },
            ),
            (
                frame("M", "msg-2"),
                Delta::MessageStart {
                    message_id: "msg-2".into(),
                },
            ),
        ];
        for (input, expected) in cases {
            let mut interp = NativeInterpreter;
            match interp.interpret(&input) {
                Ok(deltas) => assert_eq!(deltas, vec![expected]),
                Err(e) => panic!("interpret failed: {}", e),
            }
        }
    }

    #[test]
    fn test_context_scalar_is_single_value() {
        match NativeEvent::from_frame(&frame("U", r#""note""#)) {
            Ok(Some(NativeEvent::ContextUpdate(values))) => assert_eq!(values, vec![json!("note")]),
            Ok(other) => panic!("unexpected event: {:?}", other),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_malformed_structural_frames_fail_fast() {
        for tag in ["R", "U"] {
            match NativeEvent::from_frame(&frame(tag, "{bad json")) {
                Err(e) => match e.inner {
                    StreamError::FrameParse { tag: t, .. } => assert_eq!(t, tag),
                    other => panic!("expected FrameParse, got {:?}", other),
                },
                Ok(_) => panic!("expected error for {}", tag),
            }
        }
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let mut interp = NativeInterpreter;
        assert!(matches!(interp.interpret(&frame("X", "?")), Ok(d) if d.is_empty()));
        assert!(matches!(interp.interpret(&SseFrame::data("x")), Ok(d) if d.is_empty()));
    }

    #[test]
    fn test_to_sse_string() {
        let text = NativeEvent::TextDelta("a\nb".into()).to_sse_string().unwrap();
        assert_eq!(text, "event: T\ndata: a\ndata: b\n\n");

        let template = NativeEvent::ResponseTemplate(TemplatePayload {
            name: "card".into(),
            template_props: json!({"x": 1}),
        })
        .to_sse_string()
        .unwrap();
        assert_eq!(
            template,
            "event: R\ndata: {\"name\":\"card\",\"templateProps\":{\"x\":1}}\n\n"
        );
    }
}
