//! JSON Repair for Streaming Buffers
//!
//! Best-effort parsing of a growing, possibly truncated JSON document. The whole
//! buffer is re-parsed on every call; there is no parser state between calls.
//!
//! Closing rules when the buffer ends mid-document:
//! - an unterminated string is closed with the characters seen so far; a dangling
//!   escape (`\` or an incomplete `\uXXXX`) is dropped
//! - unterminated arrays and objects are closed at the point the input ends
//! - an object key with no value yet (`{"a"` or `{"a":`) is dropped
//! - a truncated literal (`tr`, `fals`, `nu`) completes to that literal
//! - a truncated number keeps its longest valid prefix (`1.` -> `1`, `-` -> dropped)
//! - stray commas are tolerated, content after the first complete top-level value is ignored
//!
//! Input that is invalid for reasons other than truncation is an error.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Detects if a JSON string is incomplete (unbalanced braces/quotes)
pub fn is_json_complete(json_str: &str) -> bool {
    let trimmed = json_str.trim();
    if trimmed.is_empty() {
        return false;
    }

    let mut brace_count = 0;
    let mut bracket_count = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => brace_count -= 1,
            '[' if !in_string => bracket_count += 1,
            ']' if !in_string => bracket_count -= 1,
            _ => {}
        }

        if brace_count < 0 || bracket_count < 0 {
            return false;
        }
    }

    !in_string && brace_count == 0 && bracket_count == 0
}

/// Attempts to parse JSON, with fallback to tolerant parsing of a truncated buffer
pub fn parse_json_with_repair(json_str: &str) -> Result<Value, String> {
    if let Ok(value) = serde_json::from_str::<Value>(json_str) {
        return Ok(value);
    }

    if json_str.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let mut parser = PartialParser::new(json_str);
    match parser.parse_value(0) {
        Ok(Some(value)) => {
            tracing::trace!(
                "[JSON-REPAIR] Parsed truncated JSON ({} chars, truncated={})",
                json_str.len(),
                parser.truncated
            );
            Ok(value)
        }
        Ok(None) => Err(format!(
            "No JSON value recoverable from {} chars",
            json_str.len()
        )),
        Err(e) => Err(format!(
            "Failed to parse JSON even with repair: {} at byte {} (original: {} chars)",
            e,
            parser.pos,
            json_str.len()
        )),
    }
}

struct PartialParser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    truncated: bool,
}

type Step<T> = std::result::Result<T, &'static str>;

impl<'a> PartialParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            truncated: false,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// `Ok(None)` means the input ended before any value could be recovered.
    fn parse_value(&mut self, depth: usize) -> Step<Option<Value>> {
        if depth > MAX_DEPTH {
            return Err("nesting too deep");
        }
        self.skip_ws();
        let b = match self.peek() {
            Some(b) => b,
            None => {
                self.truncated = true;
                return Ok(None);
            }
        };
        match b {
            b'{' => self.parse_object(depth).map(Some),
            b'[' => self.parse_array(depth).map(Some),
            b'"' => Ok(Some(Value::String(self.parse_string()?))),
            b't' => self.parse_literal("true", Value::Bool(true)),
            b'f' => self.parse_literal("false", Value::Bool(false)),
            b'n' => self.parse_literal("null", Value::Null),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => Err("unexpected character"),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Step<Value> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    self.truncated = true;
                    return Ok(Value::Object(map));
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'"') => {
                    let key = self.parse_string()?;
                    if self.truncated {
                        return Ok(Value::Object(map));
                    }
                    self.skip_ws();
                    match self.peek() {
                        None => {
                            self.truncated = true;
                            return Ok(Value::Object(map));
                        }
                        Some(b':') => self.pos += 1,
                        Some(_) => return Err("expected ':' after object key"),
                    }
                    match self.parse_value(depth + 1)? {
                        Some(value) => {
                            map.insert(key, value);
                        }
                        None => return Ok(Value::Object(map)),
                    }
                }
                Some(_) => return Err("expected object key"),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Step<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    self.truncated = true;
                    return Ok(Value::Array(items));
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(b',') => {
                    self.pos += 1;
                }
                Some(_) => match self.parse_value(depth + 1)? {
                    Some(value) => items.push(value),
                    None => return Ok(Value::Array(items)),
                },
            }
        }
    }

    fn parse_string(&mut self) -> Step<String> {
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;
        loop {
            let b = match self.peek() {
                Some(b) => b,
                None => {
                    out.push_str(&self.src[run_start..self.pos]);
                    self.truncated = true;
                    return Ok(out);
                }
            };
            match b {
                b'"' => {
                    out.push_str(&self.src[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    out.push_str(&self.src[run_start..self.pos]);
                    match self.parse_escape()? {
                        Some(ch) => out.push(ch),
                        None => {
                            self.truncated = true;
                            return Ok(out);
                        }
                    }
                    run_start = self.pos;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Consumes one escape sequence; `Ok(None)` if the input ends inside it.
    fn parse_escape(&mut self) -> Step<Option<char>> {
        self.pos += 1;
        let b = match self.peek() {
            Some(b) => b,
            None => return Ok(None),
        };
        self.pos += 1;
        let ch = match b {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => {
                let hi = match self.read_hex4()? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                if (0xD800..0xDC00).contains(&hi) {
                    if self.bytes.len() < self.pos + 2 {
                        self.pos = self.bytes.len();
                        return Ok(None);
                    }
                    if &self.bytes[self.pos..self.pos + 2] != b"\\u" {
                        return Err("unpaired surrogate");
                    }
                    self.pos += 2;
                    let lo = match self.read_hex4()? {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    if !(0xDC00..0xE000).contains(&lo) {
                        return Err("invalid low surrogate");
                    }
                    let code = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
                    return char::from_u32(code).map(Some).ok_or("invalid code point");
                }
                return char::from_u32(hi).map(Some).ok_or("invalid code point");
            }
            _ => return Err("invalid escape"),
        };
        Ok(Some(ch))
    }

    fn read_hex4(&mut self) -> Step<Option<u32>> {
        let end = self.pos + 4;
        if end > self.bytes.len() {
            let tail = &self.bytes[self.pos..];
            if !tail.iter().all(u8::is_ascii_hexdigit) {
                return Err("invalid unicode escape");
            }
            self.pos = self.bytes.len();
            return Ok(None);
        }
        if !self.bytes[self.pos..end].iter().all(u8::is_ascii_hexdigit) {
            return Err("invalid unicode escape");
        }
        let hex = &self.src[self.pos..end];
        let value = u32::from_str_radix(hex, 16).map_err(|_| "invalid unicode escape")?;
        self.pos = end;
        Ok(Some(value))
    }

    fn parse_literal(&mut self, word: &'static str, value: Value) -> Step<Option<Value>> {
        let rest = &self.bytes[self.pos..];
        let n = rest.len().min(word.len());
        if rest[..n] != word.as_bytes()[..n] {
            return Err("invalid literal");
        }
        self.pos += n;
        if n < word.len() {
            self.truncated = true;
        }
        Ok(Some(value))
    }

    fn parse_number(&mut self) -> Step<Option<Value>> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let at_end = self.pos == self.bytes.len();
        let mut text = &self.src[start..self.pos];
        loop {
            if let Ok(n) = text.parse::<Number>() {
                if text.len() < self.pos - start {
                    if !at_end {
                        return Err("invalid number");
                    }
                    self.truncated = true;
                }
                return Ok(Some(Value::Number(n)));
            }
            match text.len() {
                0 | 1 => break,
                len => text = &text[..len - 1],
            }
        }
        if at_end {
            self.truncated = true;
            Ok(None)
        } else {
            Err("invalid number")
        }
    }
}
