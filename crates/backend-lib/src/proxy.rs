// ============================
// crates/backend-lib/src/proxy.rs
// ============================
//! Passthrough to the external dashboard statistics endpoint.
use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

/// `GET /api/dashboard/totalusers` — relays the upstream JSON body
pub async fn total_users(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let body = state
        .http
        .get(&state.settings.stats_upstream)
        .send()
        .await?
        .json::<Value>()
        .await?;
    Ok(Json(body))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
