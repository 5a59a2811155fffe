use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — public liveness probe, no auth required.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocol": aegis_core::config::PROTOCOL_VERSION,
        "skills": state.registry.names().len(),
    }))
}
