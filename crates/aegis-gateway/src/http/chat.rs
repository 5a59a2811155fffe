//! POST /api/v1/chat — the gateway's single synchronous entry point into
//! `AgentBrain::process_message`.
//!
//! Request:  `{"message": "...", "conversation_id": "..."}` (conversation_id optional)
//! Response: `{"response": "...", "conversation_id": "...", "tokens_used": N, "cost_usd": N}`
//! Error:    `{"error": "..."}`

use std::sync::Arc;

use aegis_audit::AuditEntry;
use aegis_security::InputValidator;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: String,
    pub tokens_used: u32,
    pub cost_usd: f64,
}

#[derive(Serialize)]
pub struct ChatError {
    pub error: String,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }

    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: "message cannot be empty".to_string() }),
        ));
    }

    let validation = InputValidator::new().validate_message(&req.message);
    if !validation.valid {
        let entry = AuditEntry::new("input.validate", "http", "chat.message", "blocked", "http")
            .with_detail(validation.blocked_reason.clone());
        let _ = state.audit.log(entry);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: validation.blocked_reason }),
        ));
    }
    if !validation.warnings.is_empty() {
        let entry = AuditEntry::new("input.validate", "http", "chat.message", "allowed_with_warnings", "http")
            .with_detail(validation.warnings.join("; "));
        let _ = state.audit.log(entry);
    }

    let outcome = state
        .brain
        .process_message(req.conversation_id, "http", None, &validation.sanitized)
        .await
        .map_err(|e| {
            warn!(error = %e, code = e.code(), "POST /api/v1/chat failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ChatError { error: e.to_string() }))
        })?;

    Ok(Json(ChatReply {
        response: outcome.response,
        conversation_id: outcome.conversation_id,
        tokens_used: outcome.tokens_in + outcome.tokens_out,
        cost_usd: outcome.cost_usd,
    }))
}

fn unauthorized() -> (StatusCode, Json<ChatError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ChatError { error: "unauthorized: set 'Authorization: Bearer <token>'".to_string() }),
    )
}

pub(crate) fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    extract_bearer(headers).map(|t| state.auth.touch(t)).unwrap_or(false)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
