//! Message Reducer: folds semantic deltas into one `AssistantMessage` and
//! publishes a snapshot to the sink after every delta.
//!
//! The first emission for an id is a create, every later one an update. A
//! `MessageStart` naming a different id deletes the old id from the sink (when
//! it was ever created) before the next emission creates the new one.

use crate::constants::TEMPLATE_CONTENT_FIELD;
use crate::json_repair::is_json_complete;
use crate::sink::MessageSink;
use crate::types::*;
use serde_json::{Map, Value};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerState {
    AwaitingFirstDelta,
    Streaming,
    Closed,
}

pub struct MessageReducer<S: MessageSink> {
    sink: S,
    message: AssistantMessage,
    previous_id: Option<String>,
    is_first_emission: bool,
    created: bool,
    state: ReducerState,
    run_errors: usize,
    start_time: Instant,
}

impl<S: MessageSink> MessageReducer<S> {
    /// Starts from an empty message with a generated id.
    pub fn new(sink: S) -> Self {
        Self::with_message(sink, AssistantMessage::with_generated_id())
    }

    pub fn with_message_id(sink: S, id: impl Into<String>) -> Self {
        Self::with_message(sink, AssistantMessage::new(id))
    }

    fn with_message(sink: S, message: AssistantMessage) -> Self {
        Self {
            sink,
            message,
            previous_id: None,
            is_first_emission: true,
            created: false,
            state: ReducerState::AwaitingFirstDelta,
            run_errors: 0,
            start_time: Instant::now(),
        }
    }

    pub fn state(&self) -> ReducerState {
        self.state
    }

    pub fn message(&self) -> &AssistantMessage {
        &self.message
    }

    /// The id replaced by the most recent identity change.
    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn run_errors(&self) -> usize {
        self.run_errors
    }

    /// Applies one delta, then emits the resulting snapshot.
    pub fn apply(&mut self, delta: Delta) -> Result<()> {
        if self.state == ReducerState::Closed {
            return Err(StreamError::InvariantViolation(format!(
                "'{}' delta received after the message was closed",
                delta.kind()
            ))
            .into());
        }
        self.state = ReducerState::Streaming;
        tracing::trace!("[REDUCER] Applying {}", delta.kind());

        match delta {
            Delta::MessageStart { message_id } => self.change_identity(message_id),
            Delta::TextContent { delta } => self.push_text(delta),
            Delta::TextEnd | Delta::ToolCallEnd { .. } => {}
            Delta::ToolCallStart { tool_call_id, name } => {
                if self.message.tool_call(&tool_call_id).is_some() {
                    tracing::warn!(
                        "[REDUCER] Duplicate tool call start for {}; keeping existing call",
                        tool_call_id
                    );
                } else {
                    self.message.tool_calls.push(ToolCall::new(tool_call_id, name));
                }
            }
            Delta::ToolCallArgs {
                tool_call_id,
                delta,
            } => {
                match self
                    .message
                    .tool_calls
                    .iter_mut()
                    .find(|tc| tc.id == tool_call_id)
                {
                    Some(tc) => tc.function.arguments.push_str(&delta),
                    None => tracing::debug!(
                        "[REDUCER] Ignoring args for unknown tool call {}",
                        tool_call_id
                    ),
                }
            }
            Delta::ResponseTemplate {
                name,
                template_props,
            } => self.message.content.push(ContentPart::Template {
                name,
                template_props,
            }),
            Delta::TemplatePropsDelta { delta } => self.push_template_props(delta)?,
            Delta::ContextUpdate { values } => self.message.context.extend(values),
            Delta::RunError { message, code } => {
                self.run_errors += 1;
                tracing::error!(
                    "[REDUCER] Upstream run error (code: {}): {}",
                    code.as_deref().unwrap_or("none"),
                    message
                );
            }
        }

        self.emit();
        Ok(())
    }

    fn change_identity(&mut self, new_id: String) {
        if new_id == self.message.id {
            return;
        }
        let old_id = std::mem::replace(&mut self.message.id, new_id);
        if self.created {
            tracing::debug!(
                "[REDUCER] Message id changed {} -> {}; deleting old message",
                old_id,
                self.message.id
            );
            self.sink.delete_message(&old_id);
        } else {
            tracing::debug!(
                "[REDUCER] Message id changed {} -> {} before first emission",
                old_id,
                self.message.id
            );
        }
        self.previous_id = Some(old_id);
        self.is_first_emission = true;
        self.created = false;
    }

    fn push_text(&mut self, delta: String) {
        if let Some(ContentPart::Text { text }) = self.message.content.last_mut() {
            text.push_str(&delta);
            return;
        }
        self.message.content.push(ContentPart::Text { text: delta });
    }

    fn push_template_props(&mut self, delta: String) -> Result<()> {
        let template_props = match self.message.content.last_mut() {
            Some(ContentPart::Template { template_props, .. }) => template_props,
            Some(other) => {
                return Err(StreamError::InvariantViolation(format!(
                    "template props delta with last content part of type '{}'",
                    other.kind()
                ))
                .into())
            }
            None => {
                return Err(StreamError::InvariantViolation(
                    "template props delta with no content parts".to_string(),
                )
                .into())
            }
        };

        if !template_props.is_object() {
            *template_props = Value::Object(Map::new());
        }
        if let Value::Object(props) = template_props {
            match props.get_mut(TEMPLATE_CONTENT_FIELD) {
                Some(Value::String(content)) => content.push_str(&delta),
                Some(other) => {
                    let mut content = match &*other {
                        Value::Null => String::new(),
                        v => v.to_string(),
                    };
                    content.push_str(&delta);
                    *other = Value::String(content);
                }
                None => {
                    props.insert(TEMPLATE_CONTENT_FIELD.to_string(), Value::String(delta));
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self) {
        if self.is_first_emission {
            self.sink.create_message(&self.message);
            self.is_first_emission = false;
            self.created = true;
        } else {
            self.sink.update_message(&self.message);
        }
    }

    /// Closes the reducer and returns the final message. Deltas applied
    /// afterwards are rejected.
    pub fn finish(&mut self) -> AssistantMessage {
        self.state = ReducerState::Closed;
        for tc in &self.message.tool_calls {
            if !tc.function.arguments.is_empty() && !is_json_complete(&tc.function.arguments) {
                tracing::warn!(
                    "[REDUCER] Tool call {} ({}) closed with incomplete arguments: {}",
                    tc.id,
                    tc.function.name,
                    crate::str_utils::log_snippet(
                        &tc.function.arguments,
                        crate::constants::LOG_SNIPPET_CHARS
                    )
                );
            }
        }
        self.log_finalized_message();
        self.message.clone()
    }

    fn log_finalized_message(&self) {
        let mut parts_summary = Vec::new();
        let mut total_text_len = 0;
        for p in &self.message.content {
            match p {
                ContentPart::Text { text } => {
                    total_text_len += text.len();
                    parts_summary.push(format!("text({} chars)", text.len()));
                }
                ContentPart::Template { name, .. } => {
                    parts_summary.push(format!("template({})", name));
                }
            }
        }
        let tools: Vec<&str> = self
            .message
            .tool_calls
            .iter()
            .map(|tc| tc.function.name.as_str())
            .collect();

        tracing::info!(
            "[REDUCER] Message {} closed. Latency: {:?}\n\
             Summary: {}\n\
             Stats: {} chars text, {} tools ({}), {} context values, {} run errors",
            self.message.id,
            self.start_time.elapsed(),
            parts_summary.join(", "),
            total_text_len,
            tools.len(),
            tools.join(", "),
            self.message.context.len(),
            self.run_errors
        );
    }
}
