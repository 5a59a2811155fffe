use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("fact not found: {category}/{id}")]
    FactNotFound { category: String, id: i64 },

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl MemoryError {
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::Database(_) => "MEMORY_DATABASE_ERROR",
            MemoryError::ConversationNotFound(_) => "MEMORY_CONVERSATION_NOT_FOUND",
            MemoryError::FactNotFound { .. } => "MEMORY_FACT_NOT_FOUND",
            MemoryError::MigrationFailed(_) => "MEMORY_MIGRATION_FAILED",
            MemoryError::Serialization(_) => "MEMORY_SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
