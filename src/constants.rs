/// SSE field prefixes
pub const DATA_PREFIX: &str = "data:";
pub const EVENT_PREFIX: &str = "event:";

/// Payload that ends the logical stream even if bytes remain unread
pub const DONE_SENTINEL: &str = "[DONE]";

/// Native tagged-event letters
pub const TAG_TEXT_DELTA: &str = "T";
pub const TAG_RESPONSE_TEMPLATE: &str = "R";
pub const TAG_TEMPLATE_PROPS_STREAM: &str = "C";
pub const TAG_CONTEXT_UPDATE: &str = "U";
pub const TAG_MESSAGE_ID_UPDATE: &str = "M";

/// Field inside `templateProps` that `C` frames append to
pub const TEMPLATE_CONTENT_FIELD: &str = "content";

/// Stream defaults
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_MAX_FRAMES: usize = 100_000;

/// Log snippet length for skipped frames
pub const LOG_SNIPPET_CHARS: usize = 200;

/// Environment variable holding the bearer token for `--url` replays
pub const API_KEY_ENV: &str = "ASSISTANT_STREAM_API_KEY";

/// `EnvFilter` directive used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "assistant_stream=info";
