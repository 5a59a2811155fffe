//! Everything read-only and authenticated beyond `/chat`: process status,
//! cost accounting, the skill index, conversation history, and the audit
//! trail.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::chat::authorized;

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()})))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(json!({
        "model": state.config.agent.model,
        "autonomy_level": state.config.policy.autonomy_level,
        "daily_budget_usd": state.config.agent.daily_budget_usd,
        "skills": state.registry.names(),
    })))
}

pub async fn cost_today(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let spent = state.memory.aggregate_cost_for_date(&today).map_err(internal)?;
    Ok(Json(json!({"date": today, "cost_usd": spent, "budget_usd": state.config.agent.daily_budget_usd})))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_days")]
    days: u32,
}

fn default_history_days() -> u32 {
    30
}

pub async fn cost_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let rows = state.memory.cost_by_day(query.days).map_err(internal)?;
    Ok(Json(json!({
        "days": rows.into_iter().map(|(date, cost_usd)| json!({"date": date, "cost_usd": cost_usd})).collect::<Vec<_>>(),
    })))
}

pub async fn skills_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let skills: Vec<Value> = state
        .registry
        .tool_definitions()
        .into_iter()
        .map(|m| json!({"name": m.name, "description": m.description}))
        .collect();
    Ok(Json(json!({"skills": skills})))
}

#[derive(Deserialize)]
pub struct ConversationsQuery {
    #[serde(default = "default_conversations_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_conversations_limit() -> usize {
    50
}

#[derive(Serialize)]
struct ConversationSummary {
    id: String,
    channel: String,
    started_at: String,
    ended_at: Option<String>,
    summary: Option<String>,
}

pub async fn conversations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let rows = state.memory.list_conversations(query.limit, query.offset).map_err(internal)?;
    let conversations: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|c| ConversationSummary {
            id: c.id,
            channel: c.channel,
            started_at: c.started_at,
            ended_at: c.ended_at,
            summary: c.summary,
        })
        .collect();
    Ok(Json(json!({"conversations": conversations})))
}

pub async fn conversation_detail_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let conversation = state
        .memory
        .get_conversation(&id)
        .map_err(|_| (StatusCode::NOT_FOUND, Json(json!({"error": "conversation not found"}))))?;
    let messages = state.memory.list_messages(&id, 200, 0).map_err(internal)?;
    Ok(Json(json!({
        "id": conversation.id,
        "channel": conversation.channel,
        "started_at": conversation.started_at,
        "ended_at": conversation.ended_at,
        "summary": conversation.summary,
        "messages": messages.into_iter().map(|m| json!({
            "role": m.role,
            "content": m.content,
            "timestamp": m.timestamp,
        })).collect::<Vec<_>>(),
    })))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    limit: usize,
}

fn default_audit_limit() -> usize {
    100
}

pub async fn audit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !authorized(&state, &headers) {
        return Err(unauthorized());
    }
    let mut entries = state.audit.read_all().map_err(internal)?;
    if entries.len() > query.limit {
        entries = entries.split_off(entries.len() - query.limit);
    }
    Ok(Json(json!({"entries": entries})))
}
