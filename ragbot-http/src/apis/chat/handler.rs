use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{error, info};
use uuid::Uuid;

use super::types::ChatRequest;
use crate::streaming::stream_response;
use crate::{ApiJson, ErrorResponse, ServerState};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Handle `POST /chat/stream` - streams the agent reply as NDJSON records
pub async fn handle_chat_stream(
    State(state): State<ServerState>,
    ApiJson(payload): ApiJson<ChatRequest>,
) -> Result<Response, ErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    info!(
        "[{}] POST /chat/stream session={} prompt_len={}",
        request_id,
        payload.session_id.as_deref().unwrap_or("-"),
        payload.prompt.len()
    );

    let stream = stream_response(
        state.agents.as_ref(),
        payload.prompt,
        payload.session_id.as_deref(),
        state.stream_buffer,
        &request_id,
    )
    .await
    .map_err(|e| {
        error!("[{}] Failed to start stream: {}", request_id, e);
        ErrorResponse::from(e)
    })?;

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}
