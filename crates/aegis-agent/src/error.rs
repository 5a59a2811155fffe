use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrainError {
    #[error("memory error: {0}")]
    Memory(#[from] aegis_memory::MemoryError),

    #[error("provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("tool call arguments were not valid JSON: {0}")]
    InvalidToolArgs(String),
}

impl BrainError {
    pub fn code(&self) -> &'static str {
        match self {
            BrainError::Memory(_) => "AGENT_MEMORY_ERROR",
            BrainError::Provider(_) => "AGENT_PROVIDER_ERROR",
            BrainError::InvalidToolArgs(_) => "AGENT_INVALID_TOOL_ARGS",
        }
    }
}

pub type Result<T> = std::result::Result<T, BrainError>;
