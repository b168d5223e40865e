use crate::constants::{DATA_PREFIX, DONE_SENTINEL, EVENT_PREFIX, LOG_SNIPPET_CHARS};
use crate::streaming::StreamConfig;
use crate::types::*;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::borrow::Cow;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};
use tokio_util::io::StreamReader;

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// One SSE record as transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Only an untyped `data: [DONE]` record ends the stream; a typed record
    /// carrying that text is ordinary payload.
    pub fn is_done(&self) -> bool {
        self.event.is_none() && self.data.trim() == DONE_SENTINEL
    }

    pub fn snippet(&self) -> std::borrow::Cow<'_, str> {
        crate::str_utils::log_snippet(&self.data, LOG_SNIPPET_CHARS)
    }
}

/// How lines are grouped into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Every `data:` line is a frame on its own; other lines are ignored.
    DataLines,
    /// `event:`/`data:` fields accumulate until a blank line dispatches the record.
    Records,
}

#[derive(Debug, Default)]
struct PendingRecord {
    event: Option<String>,
    data: Option<String>,
}

impl PendingRecord {
    fn take_frame(&mut self) -> Option<SseFrame> {
        let pending = std::mem::take(self);
        pending.data.map(|data| SseFrame {
            event: pending.event,
            data,
        })
    }
}

/// Line-oriented SSE decoder. UTF-8 decoding happens per complete line, so
/// multi-byte characters split across reads are reassembled. Invalid bytes
/// are replaced with U+FFFD and decoding continues.
#[derive(Debug)]
pub struct SseCodec {
    lines: AnyDelimiterCodec,
    mode: FrameMode,
    pending: PendingRecord,
}

impl SseCodec {
    pub fn new(mode: FrameMode, max_line_length: usize) -> Self {
        Self {
            lines: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_line_length,
            ),
            mode,
            pending: PendingRecord::default(),
        }
    }

    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        match self.mode {
            FrameMode::DataLines => {
                let data = field_value(line, DATA_PREFIX)?.trim();
                Some(SseFrame::data(data))
            }
            FrameMode::Records => {
                if line.is_empty() {
                    return self.pending.take_frame();
                }
                if line.starts_with(':') {
                    return None;
                }
                if let Some(value) = field_value(line, DATA_PREFIX) {
                    match self.pending.data.as_mut() {
                        Some(data) => {
                            data.push('\n');
                            data.push_str(value);
                        }
                        None => self.pending.data = Some(value.to_string()),
                    }
                } else if let Some(value) = field_value(line, EVENT_PREFIX) {
                    self.pending.event = Some(value.to_string());
                } else {
                    tracing::trace!("[SSE] Ignoring line: {}", line);
                }
                None
            }
        }
    }
}

/// One raw line, without its trailing `\r`, decoded lossily.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if let Cow::Owned(_) = &line {
        tracing::warn!(
            "[SSE] Invalid UTF-8 in line, replaced: {}",
            crate::str_utils::log_snippet(&line, LOG_SNIPPET_CHARS)
        );
    }
    line
}

/// Value of `field:` with one optional leading space removed.
fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    Some(match rest.strip_prefix(' ') {
        Some(v) => v,
        None => rest,
    })
}

impl Decoder for SseCodec {
    type Item = SseFrame;
    type Error = AnyDelimiterCodecError;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<SseFrame>, AnyDelimiterCodecError> {
        while let Some(raw) = self.lines.decode(buf)? {
            if let Some(frame) = self.accept_line(&decode_line(&raw)) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<SseFrame>, AnyDelimiterCodecError> {
        while let Some(raw) = self.lines.decode_eof(buf)? {
            if let Some(frame) = self.accept_line(&decode_line(&raw)) {
                return Ok(Some(frame));
            }
        }
        // A record cut off without its blank line is still delivered.
        Ok(self.pending.take_frame())
    }
}

/// An HTTP-response-like holder of a streamed body.
pub struct StreamedResponse {
    body: Option<ByteStream>,
}

impl StreamedResponse {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            body: Some(Box::pin(stream)),
        }
    }

    /// Body delivered as the given chunks, in order.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<std::io::Result<Bytes>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::from_stream(futures_util::stream::iter(chunks))
    }

    pub fn without_body() -> Self {
        Self { body: None }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn into_body(self) -> Result<ByteStream> {
        match self.body {
            Some(body) => Ok(body),
            None => Err(StreamError::StreamUnavailable.into()),
        }
    }
}

impl From<reqwest::Response> for StreamedResponse {
    fn from(response: reqwest::Response) -> Self {
        let bytes_stream = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other));
        Self::from_stream(bytes_stream)
    }
}

/// Pull-based frame sequence over one response body. Ends on `[DONE]`,
/// end of input, or the first read error.
pub struct FrameSource {
    reader: FramedRead<StreamReader<ByteStream, Bytes>, SseCodec>,
    frames_seen: usize,
    max_frames: usize,
    finished: bool,
}

impl FrameSource {
    pub fn open(response: StreamedResponse, mode: FrameMode, config: &StreamConfig) -> Result<Self> {
        let body = response.into_body()?;
        Ok(Self {
            reader: FramedRead::new(
                StreamReader::new(body),
                SseCodec::new(mode, config.max_line_length),
            ),
            frames_seen: 0,
            max_frames: config.max_frames,
            finished: false,
        })
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub async fn next_frame(&mut self) -> Option<Result<SseFrame>> {
        if self.finished {
            return None;
        }
        match self.reader.next().await {
            None => {
                self.finished = true;
                None
            }
            Some(Err(e)) => {
                tracing::error!("[SSE] Line Parse Error: {}", e);
                self.finished = true;
                let io_err = match e {
                    AnyDelimiterCodecError::Io(io) => io,
                    AnyDelimiterCodecError::MaxChunkLengthExceeded => {
                        std::io::Error::other("Max line length exceeded")
                    }
                };
                Some(Err(io_err.into()))
            }
            Some(Ok(frame)) => {
                if frame.is_done() {
                    tracing::debug!("[SSE] Stream end marker [DONE] received");
                    self.finished = true;
                    return None;
                }
                self.frames_seen += 1;
                if self.frames_seen > self.max_frames {
                    tracing::error!("[SSE] Stream exceeded max frame limit ({})", self.max_frames);
                    self.finished = true;
                    return Some(Err(StreamError::Internal(
                        "Stream exceeded max frame limit".to_string(),
                        tracing_error::SpanTrace::capture(),
                    )
                    .into()));
                }
                Some(Ok(frame))
            }
        }
    }
}

/// Encodes one SSE record; multi-line data is split over several `data:` lines.
pub fn encode_record(event: Option<&str>, data: &str) -> String {
    let mut out = String::with_capacity(data.len() + 16);
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push('\n');
    }
    out.push('\n');
    out
}
