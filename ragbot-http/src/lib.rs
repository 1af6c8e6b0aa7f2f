pub mod apis;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod streaming;

pub use apis::chat::{ChatChunk, ChatRequest, NDJSON_CONTENT_TYPE};
pub use error::{ApiJson, ErrorResponse};
pub use http::{router, start_server, ServerConfig, ServerState};
pub use streaming::{stream_response, ChunkStream};
