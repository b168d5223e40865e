use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;

lazy_static! {
    static ref REDACTION_REGEX: Regex = Regex::new(
        r#"(?i)(sk-[A-Za-z0-9_\-]{20,}|Bearer\s+[^\s"]+|x-api-key:\s*[^\s"]+|"api_?key"\s*:\s*"[^"]*")"#
    )
    .expect("Invalid redaction regex");
}

/// Scrubs credentials from everything written through it.
pub struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

pub fn redact(input: &str) -> std::borrow::Cow<'_, str> {
    REDACTION_REGEX.replace_all(input, "[REDACTED]")
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let redacted = redact(&input);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
