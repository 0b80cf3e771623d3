//! Route handlers.

pub mod downloads;
pub mod tasks;
pub mod upload;

use axum::Json;
use serde_json::{json, Value};

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
