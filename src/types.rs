use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;
use uuid::Uuid;

/// --- CORE ROLES ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Assistant,
}

/// --- THE ACCUMULATED MESSAGE ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub context: Vec<Value>,
}

impl AssistantMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: Vec::new(),
            tool_calls: Vec::new(),
            context: Vec::new(),
        }
    }

    /// Fresh message with a random optimistic id.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// All text parts joined in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Template { .. } => None,
            })
            .collect()
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|tc| tc.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_calls.is_empty() && self.context.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Template {
        name: String,
        #[serde(rename = "templateProps", default)]
        template_props: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Template { .. } => "template",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallKind {
    #[default]
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ToolCallKind,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text, grown by appending deltas.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ToolCallKind::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: String::new(),
            },
        }
    }

    /// Best-effort view of the arguments, usable while they are still streaming.
    pub fn parsed_arguments(&self) -> Option<Value> {
        if self.function.arguments.trim().is_empty() {
            return None;
        }
        crate::json_repair::parse_json_with_repair(&self.function.arguments).ok()
    }
}

/// --- SEMANTIC DELTAS (wire-independent) ---

#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Announces the message id; a different id than the current one is an identity change.
    MessageStart { message_id: String },
    TextContent { delta: String },
    TextEnd,
    ToolCallStart { tool_call_id: String, name: String },
    ToolCallArgs { tool_call_id: String, delta: String },
    ToolCallEnd { tool_call_id: String },
    ResponseTemplate { name: String, template_props: Value },
    TemplatePropsDelta { delta: String },
    ContextUpdate { values: Vec<Value> },
    RunError { message: String, code: Option<String> },
}

impl Delta {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::TextContent { .. } => "text_content",
            Self::TextEnd => "text_end",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallArgs { .. } => "tool_call_args",
            Self::ToolCallEnd { .. } => "tool_call_end",
            Self::ResponseTemplate { .. } => "response_template",
            Self::TemplatePropsDelta { .. } => "template_props_delta",
            Self::ContextUpdate { .. } => "context_update",
            Self::RunError { .. } => "run_error",
        }
    }
}

/// --- ERRORS ---

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream unavailable: response has no readable body")]
    StreamUnavailable,

    #[error("Malformed '{tag}' frame: {source}")]
    FrameParse {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: StreamError,
    pub span_trace: SpanTrace,
}

impl fmt::Display for ObservedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<StreamError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;
