use thiserror::Error;

/// Umbrella error type the gateway converts every subsystem error into at
/// the HTTP/WS boundary. Individual crates keep their own `thiserror` enum
/// (`VaultError`, `SecurityError`, `SandboxError`, `MemoryError`, …) — this
/// type exists so `aegis-gateway` has one place to map "what happened" onto
/// a stable string code and an HTTP status.
#[derive(Debug, Error)]
pub enum AegisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("Policy requires confirmation: {reason}")]
    PolicyAskUser { reason: String },

    #[error("Vault is locked")]
    VaultLocked,

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("DLP block: {0}")]
    DlpBlock(String),

    #[error("Canary triggered: {0}")]
    CanaryTriggered(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AegisError {
    /// Short error code string sent to clients in WS/HTTP error frames.
    pub fn code(&self) -> &'static str {
        match self {
            AegisError::Config(_) => "CONFIG_ERROR",
            AegisError::AuthFailed(_) => "AUTH_FAILED",
            AegisError::Protocol(_) => "PROTOCOL_ERROR",
            AegisError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            AegisError::PolicyDenied { .. } => "POLICY_DENY",
            AegisError::PolicyAskUser { .. } => "POLICY_ASK",
            AegisError::VaultLocked => "VAULT_LOCKED",
            AegisError::Sandbox(_) => "SANDBOX_ERROR",
            AegisError::DlpBlock(_) => "DLP_BLOCK",
            AegisError::CanaryTriggered(_) => "CANARY_TRIGGERED",
            AegisError::Database(_) => "DATABASE_ERROR",
            AegisError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            AegisError::BudgetExceeded(_) => "BUDGET_EXCEEDED",
            AegisError::Serialization(_) => "SERIALIZATION_ERROR",
            AegisError::Io(_) => "IO_ERROR",
            AegisError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AegisError::Timeout { .. } => "TIMEOUT",
            AegisError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this error should be reported as, when surfaced over the
    /// gateway's REST/WS surface.
    pub fn status_code(&self) -> u16 {
        match self {
            AegisError::AuthFailed(_) | AegisError::VaultLocked => 401,
            AegisError::PolicyDenied { .. } | AegisError::DlpBlock(_) | AegisError::CanaryTriggered(_) => 403,
            AegisError::MethodNotFound { .. } => 404,
            AegisError::PayloadTooLarge { .. } => 413,
            AegisError::Timeout { .. } => 408,
            AegisError::BudgetExceeded(_) => 429,
            AegisError::Config(_) | AegisError::Protocol(_) | AegisError::PolicyAskUser { .. } => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AegisError>;
