use axum::response::Json;
use serde_json::{json, Value};

/// Liveness probe
pub async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
