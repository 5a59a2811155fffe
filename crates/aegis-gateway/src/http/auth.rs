//! `POST /api/v1/auth/setup-totp`, `POST /api/v1/auth/totp`,
//! `POST /api/v1/auth/logout` — the three endpoints that drive
//! `AuthSessionStore` through Unconfigured -> Configured -> Active.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::AuthState;

#[derive(Serialize)]
pub struct SetupTotpReply {
    secret: String,
    provisioning_uri: String,
}

/// Only callable while unconfigured — once a secret has been confirmed,
/// re-running setup would let anyone reachable on loopback reset the
/// second factor out from under an already-logged-in operator.
pub async fn setup_totp(State(state): State<Arc<AppState>>) -> Result<Json<SetupTotpReply>, (StatusCode, Json<Value>)> {
    if state.auth.state() != AuthState::Unconfigured {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "TOTP is already configured"})),
        ));
    }
    let (secret, provisioning_uri) = state.auth.begin_setup("aegis", "local");
    Ok(Json(SetupTotpReply { secret, provisioning_uri }))
}

#[derive(Deserialize)]
pub struct TotpRequest {
    code: String,
}

#[derive(Serialize)]
pub struct TotpReply {
    token: String,
}

pub async fn verify_totp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TotpRequest>,
) -> Result<Json<TotpReply>, (StatusCode, Json<Value>)> {
    match state.auth.verify_and_activate(&req.code) {
        Some(token) => Ok(Json(TotpReply { token })),
        None => Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid code"})))),
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = super::chat::extract_bearer(&headers) {
        state.auth.logout(token);
    }
    StatusCode::NO_CONTENT
}
