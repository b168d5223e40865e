use crate::adapters::{ProtocolKind, StreamProtocolAdapter};
use crate::constants::{DEFAULT_MAX_FRAMES, DEFAULT_MAX_LINE_LENGTH};
use crate::logging::StreamMetric;
use crate::reducer::MessageReducer;
use crate::sink::MessageSink;
use crate::sse::StreamedResponse;
use crate::types::*;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub protocol: ProtocolKind,
    pub max_line_length: usize,
    pub max_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl StreamConfig {
    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The stream ran to its end; carries the final accumulated message.
    Completed(AssistantMessage),
    /// The cancellation token fired. Nothing was sent to the sink afterwards.
    Cancelled,
}

impl StreamOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn into_message(self) -> Option<AssistantMessage> {
        match self {
            Self::Completed(message) => Some(message),
            Self::Cancelled => None,
        }
    }
}

pub struct StreamHandler;

impl StreamHandler {
    /// Drives one streamed response through `adapter` and the reducer, publishing
    /// snapshots to `sink`. Returns once the frame sequence ends, an error aborts
    /// it, or `cancel` fires.
    pub async fn handle_stream<S: MessageSink>(
        response: StreamedResponse,
        adapter: &dyn StreamProtocolAdapter,
        sink: S,
        config: &StreamConfig,
        cancel: Option<CancellationToken>,
    ) -> Result<StreamOutcome> {
        let span = tracing::info_span!("stream", protocol = adapter.name());
        Self::run(response, adapter, sink, config, cancel)
            .instrument(span)
            .await
    }

    async fn run<S: MessageSink>(
        response: StreamedResponse,
        adapter: &dyn StreamProtocolAdapter,
        sink: S,
        config: &StreamConfig,
        cancel: Option<CancellationToken>,
    ) -> Result<StreamOutcome> {
        let mut deltas = match adapter.parse(response, config) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!("[STREAM] Unable to open stream: {}", e.inner);
                return Err(e);
            }
        };
        let cancel = cancel.unwrap_or_default();
        let mut reducer = MessageReducer::new(sink);
        let mut metrics = StreamMetric::new(adapter.name());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = deltas.next() => Some(next),
            };
            let next = match next {
                Some(next) => next,
                None => return Ok(Self::cancelled(&metrics)),
            };

            let delta = match next {
                Some(Ok(delta)) => delta,
                Some(Err(e)) => {
                    tracing::error!("[STREAM] Stream aborted: {}", e.inner);
                    metrics.log_summary();
                    return Err(e);
                }
                None => break,
            };
            if cancel.is_cancelled() {
                return Ok(Self::cancelled(&metrics));
            }

            metrics.record_delta(&delta);
            if let Err(e) = reducer.apply(delta) {
                tracing::error!("[STREAM] Reducer rejected delta: {}", e.inner);
                metrics.log_summary();
                return Err(e);
            }
        }

        metrics.log_summary();
        Ok(StreamOutcome::Completed(reducer.finish()))
    }

    fn cancelled(metrics: &StreamMetric) -> StreamOutcome {
        tracing::info!("[STREAM] Cancelled by caller");
        metrics.log_summary();
        StreamOutcome::Cancelled
    }
}

/// Runs the pipeline with the adapter named by `config.protocol`.
pub async fn process_streamed_message<S: MessageSink>(
    response: StreamedResponse,
    sink: S,
    config: &StreamConfig,
    cancel: Option<CancellationToken>,
) -> Result<StreamOutcome> {
    let adapter = config.protocol.adapter();
    StreamHandler::handle_stream(response, adapter.as_ref(), sink, config, cancel).await
}
