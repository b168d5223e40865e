#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod adapters;
pub mod constants;
pub mod json_repair;
pub mod logging;
pub mod main_helper;
pub mod redaction_layer;
pub mod reducer;
pub mod sink;
pub mod sse;
pub mod str_utils;
pub mod streaming;
pub mod transformer;
pub mod types;

pub use types::*;

pub use adapters::{ProtocolKind, StreamProtocolAdapter};
pub use main_helper::Args;
pub use reducer::MessageReducer;
pub use sink::{CallbackSink, MemorySink, MessageSink};
pub use sse::StreamedResponse;
pub use streaming::{process_streamed_message, StreamConfig, StreamHandler, StreamOutcome};
