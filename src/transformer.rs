//! Producer side of the native wire format.
//!
//! An LLM asked for structured output streams a document of the shape
//! `{"response": [{"type": "text", "text": ...}, {"name": ..., "templateProps": {...}}]}`.
//! `ResponseTransformer` re-parses the whole accumulated buffer with the tolerant
//! JSON parser on every chunk and emits only what is new: text as `T` suffix
//! deltas while it grows, templates as one `R` record once a later entry shows
//! up (or the stream finishes).

use crate::adapters::native::{NativeEvent, TemplatePayload};
use crate::json_repair::parse_json_with_repair;
use crate::types::*;
use serde_json::{Map, Value};

const RESPONSE_FIELD: &str = "response";

#[derive(Debug, Default)]
pub struct ResponseTransformer {
    buffer: String,
    /// Entries already flushed whole.
    finalized: usize,
    /// Bytes of the open text entry already sent.
    emitted_text: usize,
}

impl ResponseTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the events it makes available.
    pub fn push(&mut self, chunk: &str) -> Result<Vec<NativeEvent>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.buffer.push_str(chunk);
        let entries = match self.parse_entries() {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        let count = entries.len();
        for (i, entry) in entries.iter().enumerate().skip(self.finalized) {
            if i + 1 == count {
                self.emit_open(entry, &mut out);
            } else {
                self.emit_final(entry, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Flushes the last entry. Call once after the final chunk.
    pub fn finish(&mut self) -> Result<Vec<NativeEvent>> {
        let entries = match self.parse_entries() {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for entry in entries.iter().skip(self.finalized) {
            self.emit_final(entry, &mut out)?;
        }
        Ok(out)
    }

    /// Convenience: `push` rendered as SSE text.
    pub fn push_sse(&mut self, chunk: &str) -> Result<String> {
        let events = self.push(chunk)?;
        to_sse(&events)
    }

    pub fn finish_sse(&mut self) -> Result<String> {
        let events = self.finish()?;
        to_sse(&events)
    }

    fn parse_entries(&self) -> Option<Vec<Value>> {
        let parsed = match parse_json_with_repair(&self.buffer) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("[TRANSFORM] Buffer not parseable yet: {}", e);
                return None;
            }
        };
        match parsed {
            Value::Object(mut map) => match map.remove(RESPONSE_FIELD) {
                Some(Value::Array(entries)) => Some(entries),
                _ => Some(Vec::new()),
            },
            _ => Some(Vec::new()),
        }
    }

    fn emit_open(&mut self, entry: &Value, out: &mut Vec<NativeEvent>) {
        if let Some(text) = entry_text(entry) {
            self.push_text_suffix(text, out);
        }
    }

    fn emit_final(&mut self, entry: &Value, out: &mut Vec<NativeEvent>) -> Result<()> {
        match entry_text(entry) {
            Some(text) => self.push_text_suffix(text, out),
            None => out.push(NativeEvent::ResponseTemplate(template_payload(entry)?)),
        }
        self.finalized += 1;
        self.emitted_text = 0;
        Ok(())
    }

    fn push_text_suffix(&mut self, text: &str, out: &mut Vec<NativeEvent>) {
        match text.get(self.emitted_text..) {
            Some("") => {}
            Some(suffix) => {
                out.push(NativeEvent::TextDelta(suffix.to_string()));
                self.emitted_text = text.len();
            }
            None => tracing::warn!(
                "[TRANSFORM] Text entry shrank below {} emitted bytes; skipping",
                self.emitted_text
            ),
        }
    }
}

/// `Some(text)` for `{"type": "text"}` entries; everything else is a template.
fn entry_text(entry: &Value) -> Option<&str> {
    if entry.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    Some(entry.get("text").and_then(Value::as_str).unwrap_or(""))
}

fn template_payload(entry: &Value) -> Result<TemplatePayload> {
    let name = match entry.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(StreamError::InvariantViolation(
                "name is required in response template".to_string(),
            )
            .into())
        }
    };
    let template_props = match entry.get("templateProps") {
        Some(props) => props.clone(),
        None => Value::Object(Map::new()),
    };
    Ok(TemplatePayload {
        name,
        template_props,
    })
}

pub fn to_sse(events: &[NativeEvent]) -> Result<String> {
    let mut out = String::new();
    for event in events {
        out.push_str(&event.to_sse_string()?);
    }
    Ok(out)
}
