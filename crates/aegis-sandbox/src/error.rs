//! Error types for the aegis-sandbox crate.

use thiserror::Error;

/// All errors that can originate from sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// PTY allocation or child-process spawn failed.
    #[error("PTY spawn error: {0}")]
    PtySpawn(String),

    /// The requested session ID does not exist in the manager.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Underlying I/O failure (read, write, flush).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation exceeded its time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Command was rejected by the pre-flight safety checker before it was
    /// ever handed to a backend.
    #[error("Command blocked: {reason}")]
    CommandBlocked { reason: String },

    /// The requested background job ID does not exist.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// No usable sandbox backend could be constructed on this platform.
    #[error("No sandbox backend available: {0}")]
    NoBackend(String),
}

impl SandboxError {
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::PtySpawn(_) => "SANDBOX_SPAWN_ERROR",
            SandboxError::SessionNotFound(_) => "SANDBOX_SESSION_NOT_FOUND",
            SandboxError::IoError(_) => "SANDBOX_IO_ERROR",
            SandboxError::Timeout { .. } => "SANDBOX_TIMEOUT",
            SandboxError::CommandBlocked { .. } => "SANDBOX_COMMAND_BLOCKED",
            SandboxError::JobNotFound(_) => "SANDBOX_JOB_NOT_FOUND",
            SandboxError::NoBackend(_) => "SANDBOX_NO_BACKEND",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SandboxError>;
