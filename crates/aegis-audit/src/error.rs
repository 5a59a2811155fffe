use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt audit entry: {0}")]
    Corrupt(String),
}

impl AuditError {
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::Io(_) => "AUDIT_IO_ERROR",
            AuditError::Serialization(_) => "AUDIT_SERIALIZATION_ERROR",
            AuditError::Corrupt(_) => "AUDIT_CORRUPT",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
