use std::sync::Arc;

use aegis_audit::AuditEntry;
use aegis_core::config::MAX_PAYLOAD_BYTES;
use aegis_security::InputValidator;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

#[derive(Deserialize)]
struct IncomingMessage {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingFrame<'a> {
    Chunk { conversation_id: &'a str, content: &'a str },
    Complete { conversation_id: &'a str, tokens_used: u32, cost_usd: f64 },
    Error { message: &'a str },
}

/// `GET /ws/chat?token=...` — the session token is checked at upgrade time
/// as a query parameter, since a browser WebSocket client cannot set an
/// `Authorization` header. No in-band handshake beyond that: once upgraded,
/// every text frame is a chat turn.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    if !state.auth.touch(&query.token) {
        return (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS chat connection");

    let (mut tx, mut rx) = socket.split();

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let text_ref: &str = &text;
                if text_ref.len() > MAX_PAYLOAD_BYTES {
                    warn!(conn_id = %conn_id, size = text_ref.len(), "payload too large, closing");
                    break;
                }

                let incoming: IncomingMessage = match serde_json::from_str(text_ref) {
                    Ok(m) => m,
                    Err(e) => {
                        let _ = send_frame(&mut tx, &OutgoingFrame::Error { message: &e.to_string() }).await;
                        continue;
                    }
                };

                if incoming.message.trim().is_empty() {
                    let _ = send_frame(&mut tx, &OutgoingFrame::Error { message: "message cannot be empty" }).await;
                    continue;
                }

                let validation = InputValidator::new().validate_message(&incoming.message);
                if !validation.valid {
                    let entry = AuditEntry::new("input.validate", "ws", "chat.message", "blocked", "ws")
                        .with_detail(validation.blocked_reason.clone());
                    let _ = state.audit.log(entry);
                    let _ = send_frame(&mut tx, &OutgoingFrame::Error { message: &validation.blocked_reason }).await;
                    continue;
                }
                if !validation.warnings.is_empty() {
                    let entry = AuditEntry::new("input.validate", "ws", "chat.message", "allowed_with_warnings", "ws")
                        .with_detail(validation.warnings.join("; "));
                    let _ = state.audit.log(entry);
                }

                // AgentBrain has no token-streaming hook: the finished
                // response goes out as a single chunk followed by complete,
                // rather than incremental deltas.
                match state.brain.process_message(incoming.conversation_id, "ws", None, &validation.sanitized).await {
                    Ok(outcome) => {
                        let chunk_sent = send_frame(
                            &mut tx,
                            &OutgoingFrame::Chunk {
                                conversation_id: &outcome.conversation_id,
                                content: &outcome.response,
                            },
                        )
                        .await;
                        if chunk_sent.is_err() {
                            break;
                        }
                        let complete_sent = send_frame(
                            &mut tx,
                            &OutgoingFrame::Complete {
                                conversation_id: &outcome.conversation_id,
                                tokens_used: outcome.tokens_in + outcome.tokens_out,
                                cost_usd: outcome.cost_usd,
                            },
                        )
                        .await;
                        if complete_sent.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "ws chat turn failed");
                        let _ = send_frame(&mut tx, &OutgoingFrame::Error { message: &e.to_string() }).await;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                if tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    info!(conn_id = %conn_id, "WS chat connection closed");
}

async fn send_frame(
    tx: &mut SplitSink<WebSocket, Message>,
    frame: &OutgoingFrame<'_>,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
