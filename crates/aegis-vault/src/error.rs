use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault already exists at {0}")]
    AlreadyExists(String),

    #[error("Vault file not found at {0}")]
    NotFound(String),

    #[error("Failed to decrypt vault. Wrong password?")]
    BadPassword,

    #[error("Vault is locked")]
    Locked,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt vault file: {0}")]
    Corrupt(String),
}

impl VaultError {
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::AlreadyExists(_) => "VAULT_ALREADY_EXISTS",
            VaultError::NotFound(_) => "VAULT_NOT_FOUND",
            VaultError::BadPassword => "VAULT_BAD_PASSWORD",
            VaultError::Locked => "VAULT_LOCKED",
            VaultError::KeyNotFound(_) => "VAULT_KEY_NOT_FOUND",
            VaultError::Io(_) => "VAULT_IO_ERROR",
            VaultError::Serialization(_) => "VAULT_SERIALIZATION_ERROR",
            VaultError::Corrupt(_) => "VAULT_CORRUPT",
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
