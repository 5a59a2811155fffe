use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server → Client: initial challenge on WS connect.
/// Sent as: `EVENT connect.challenge { nonce: "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectChallenge {
    pub nonce: String,
}

/// Client → Server: authentication request.
/// Sent as: `REQ connect { auth: { mode: "totp", code: "..." }, ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub auth: AuthPayload,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Discriminated auth payload — mode determines which fields are present.
///
/// Only two modes exist: a fresh TOTP code for the initial handshake, and
/// an existing session token for reconnects. The gateway runs loopback-only
/// for a single operator, so the teacher's tailscale-whois/trusted-proxy/
/// device-token multi-identity modes have no counterpart here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AuthPayload {
    Totp { code: String },
    Token { token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

/// Server → Client: successful auth response payload.
/// Sent as: `RES hello-ok { protocol: 1, server: {...}, ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloOk {
    pub protocol: u32,
    pub server: ServerInfo,
    pub features: ServerFeatures,
    pub snapshot: Value,
    pub policy: ClientPolicy,
    /// Opaque session token minted for this connection; present on both
    /// TOTP and token reconnect paths so the client can always persist the
    /// freshest one.
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerFeatures {
    pub streaming: bool,
    pub prompt_caching: bool,
    pub sandboxed_execution: bool,
    pub egress_filtering: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientPolicy {
    pub max_message_size: usize,
    pub rate_limit: Option<RateLimitPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
}
