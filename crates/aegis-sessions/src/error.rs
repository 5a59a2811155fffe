use thiserror::Error;

/// Errors that can occur while parsing a conversation key.
#[derive(Debug, Error)]
pub enum ConversationKeyError {
    /// The provided key string is malformed.
    ///
    /// Expected format: `channel:{channel}:user:{user_id}:{name}`
    #[error("invalid conversation key: {0}")]
    InvalidKey(String),
}

impl ConversationKeyError {
    pub fn code(&self) -> &'static str {
        match self {
            ConversationKeyError::InvalidKey(_) => "SESSIONS_INVALID_KEY",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversationKeyError>;
