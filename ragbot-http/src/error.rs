use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ragbot_core::AgentError;
use serde::Serialize;
use tracing::error;

/// Error body returned for any failure raised before the response stream
/// is committed
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    #[serde(skip_serializing)]
    pub status: StatusCode,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            status,
        }
    }

    pub fn bad_gateway(detail: String) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, detail)
    }

    pub fn internal_error(detail: String) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AgentError> for ErrorResponse {
    fn from(err: AgentError) -> Self {
        let detail = err.to_string();
        match err {
            AgentError::Upstream(_) => ErrorResponse::bad_gateway(detail),
            AgentError::Config(_) | AgentError::Cancelled | AgentError::Internal(_) => {
                ErrorResponse::internal_error(detail)
            }
        }
    }
}

/// JSON extractor that reports rejections as an [`ErrorResponse`], keeping
/// the framework's status (422 for a body missing required fields)
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ErrorResponse))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        error!("JSON deserialization error: {}", message);
        ErrorResponse::new(rejection.status(), message)
    }
}
