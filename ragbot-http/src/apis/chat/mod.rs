pub mod handler;
pub mod types;

pub use handler::{handle_chat_stream, NDJSON_CONTENT_TYPE};
pub use types::{ChatChunk, ChatRequest};
