use std::sync::Arc;

use aegis_agent::AgentBrain;
use aegis_audit::AuditLog;
use aegis_core::config::{AegisConfig, MAX_PAYLOAD_BYTES};
use aegis_memory::MemoryManager;
use aegis_skills::SkillRegistry;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthSessionStore;
use crate::middleware::{rate_limit, security_headers, RateLimiter};

/// Central shared state, reachable from every handler through axum's
/// `State` extractor — the same role the teacher's `AppState` plays,
/// trimmed to the subsystems this build actually drives. No channel
/// senders, scheduler handle, or terminal manager: those back concrete
/// channel adapters and CLI features this spec excludes.
pub struct AppState {
    pub config: AegisConfig,
    pub brain: Arc<AgentBrain>,
    pub memory: Arc<MemoryManager>,
    pub audit: Arc<AuditLog>,
    pub registry: Arc<SkillRegistry>,
    pub auth: AuthSessionStore,
}

/// Assemble the full router. Layer order, outermost first: CORS, security
/// headers, rate limiting, body-size cap, then per-route auth (each
/// protected handler checks `state.auth` itself rather than going through
/// a blanket auth layer, since `/health` and the TOTP setup/verify routes
/// must stay reachable before a session token exists).
pub fn build_router(state: Arc<AppState>) -> Router {
    let limiter = Arc::new(RateLimiter::new(60, std::time::Duration::from_secs(60)));

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/v1/auth/setup-totp", post(crate::http::auth::setup_totp))
        .route("/api/v1/auth/totp", post(crate::http::auth::verify_totp))
        .route("/api/v1/auth/logout", post(crate::http::auth::logout))
        .route("/api/v1/chat", post(crate::http::chat::chat_handler))
        .route("/api/v1/status", get(crate::http::status::status_handler))
        .route("/api/v1/cost/today", get(crate::http::status::cost_today))
        .route("/api/v1/cost/history", get(crate::http::status::cost_history))
        .route("/api/v1/skills", get(crate::http::status::skills_handler))
        .route("/api/v1/conversations", get(crate::http::status::conversations_handler))
        .route(
            "/api/v1/conversations/{id}",
            get(crate::http::status::conversation_detail_handler),
        )
        .route("/api/v1/audit", get(crate::http::status::audit_handler))
        .route("/ws/chat", get(crate::ws::connection::ws_chat_handler))
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
        .layer(axum::middleware::from_fn(security_headers))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(|origin, _| is_loopback_origin(origin)))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Loopback origins only — this gateway never expects to be reached from
/// a non-local browser tab.
fn is_loopback_origin(origin: &HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else { return false };
    s.contains("127.0.0.1") || s.contains("localhost") || s.contains("[::1]")
}
