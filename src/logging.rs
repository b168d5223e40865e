use crate::constants::DEFAULT_LOG_FILTER;
use crate::redaction_layer::RedactingWriter;
use crate::types::Delta;
use std::panic;
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Installs the global subscriber: `RUST_LOG` filter, stderr output, an optional
/// daily-rolling NDJSON file with secrets redacted, and span traces for errors.
///
/// The returned guard flushes the file writer on drop; keep it alive until exit.
pub fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_LOG_FILTER.into(),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let file_name = match path.file_name() {
                Some(name) => name.to_os_string(),
                None => "assistant-stream.log".into(),
            };
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(move || RedactingWriter::new(non_blocking.clone()));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    guard
}

/// Per-stream counters, summarised in one `[STREAM END]` line.
#[derive(Debug, Default)]
pub struct StreamMetric {
    pub protocol: &'static str,
    pub deltas: usize,
    pub text_chars: usize,
    pub templates: usize,
    pub context_values: usize,
    pub identity_changes: usize,
    pub run_errors: usize,
    pub tool_names: Vec<String>,
}

impl StreamMetric {
    pub fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    pub fn record_delta(&mut self, delta: &Delta) {
        self.deltas += 1;
        match delta {
            Delta::TextContent { delta } => self.text_chars += delta.chars().count(),
            Delta::ToolCallStart { name, .. } => self.tool_names.push(name.clone()),
            Delta::ResponseTemplate { .. } => self.templates += 1,
            Delta::ContextUpdate { values } => self.context_values += values.len(),
            Delta::MessageStart { .. } => self.identity_changes += 1,
            Delta::RunError { .. } => self.run_errors += 1,
            _ => {}
        }
    }

    pub fn log_summary(&self) {
        let tools_str = if self.tool_names.is_empty() {
            "0".to_string()
        } else {
            format!("{} ({})", self.tool_names.len(), self.tool_names.join(", "))
        };

        info!(
            "[STREAM END] Protocol: {} | Deltas: {} | Tools: {} | Text: {} chars | Templates: {} | Context: {} | Message starts: {} | Run errors: {}",
            self.protocol,
            self.deltas,
            tools_str,
            self.text_chars,
            self.templates,
            self.context_values,
            self.identity_changes,
            self.run_errors
        );
    }
}
