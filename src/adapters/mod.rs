//! Frame interpretation strategies.
//!
//! Each adapter owns the whole bytes -> deltas pipeline for one upstream wire
//! format. `parse` fails up front with `StreamUnavailable` when the response has
//! no body; after that, errors surface as items of the returned stream and end it.

pub mod ag_ui;
pub mod native;
pub mod openai;
pub mod openai_responses;

use crate::sse::{FrameMode, FrameSource, SseFrame, StreamedResponse};
use crate::streaming::StreamConfig;
use crate::types::*;
use futures_util::Stream;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

pub use ag_ui::AgUiAdapter;
pub use native::NativeAdapter;
pub use openai::OpenAiAdapter;
pub use openai_responses::OpenAiResponsesAdapter;

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta>> + Send>>;

pub trait StreamProtocolAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens a lazy, non-restartable delta sequence over the response body.
    fn parse(&self, response: StreamedResponse, config: &StreamConfig) -> Result<DeltaStream>;
}

/// Per-session, per-frame interpretation. Local failures are logged and yield no
/// deltas; an `Err` is fatal for the stream.
pub trait FrameInterpreter: Send + 'static {
    fn interpret(&mut self, frame: &SseFrame) -> Result<Vec<Delta>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    #[default]
    Native,
    AgUi,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
}

impl ProtocolKind {
    pub fn adapter(self) -> Box<dyn StreamProtocolAdapter> {
        match self {
            Self::Native => Box::new(NativeAdapter),
            Self::AgUi => Box::new(AgUiAdapter),
            Self::OpenAi => Box::new(OpenAiAdapter),
            Self::OpenAiResponses => Box::new(OpenAiResponsesAdapter),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::AgUi => "ag-ui",
            Self::OpenAi => "openai",
            Self::OpenAiResponses => "openai-responses",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "tagged" => Ok(Self::Native),
            "ag-ui" | "agui" | "generic" => Ok(Self::AgUi),
            "openai" | "openai-chat" => Ok(Self::OpenAi),
            "openai-responses" | "responses" => Ok(Self::OpenAiResponses),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

struct InterpretState<I> {
    source: FrameSource,
    interpreter: I,
    queued: VecDeque<Delta>,
    failed: bool,
}

/// Drives `interpreter` over every frame of `response`, preserving arrival order.
pub(crate) fn interpret_frames<I: FrameInterpreter>(
    response: StreamedResponse,
    mode: FrameMode,
    config: &StreamConfig,
    interpreter: I,
) -> Result<DeltaStream> {
    let source = FrameSource::open(response, mode, config)?;
    let state = InterpretState {
        source,
        interpreter,
        queued: VecDeque::new(),
        failed: false,
    };

    Ok(Box::pin(futures_util::stream::unfold(
        state,
        |mut state| async move {
            loop {
                if let Some(delta) = state.queued.pop_front() {
                    return Some((Ok(delta), state));
                }
                if state.failed {
                    return None;
                }
                let frame = match state.source.next_frame().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                    None => return None,
                };
                match state.interpreter.interpret(&frame) {
                    Ok(deltas) => state.queued.extend(deltas),
                    Err(e) => {
                        tracing::error!("[ADAPTER] Aborting stream: {}", e.inner);
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                }
            }
        },
    )))
}
