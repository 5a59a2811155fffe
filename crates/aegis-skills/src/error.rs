use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("skill already registered: {0}")]
    AlreadyRegistered(String),

    #[error("skill file not found: {0}")]
    FileNotFound(String),

    #[error("skill hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("skill is unverified and signatures are required: {0}")]
    Unverified(String),

    #[error("path traversal in skill archive member: {0}")]
    PathTraversal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkillError {
    pub fn code(&self) -> &'static str {
        match self {
            SkillError::NotFound(_) => "SKILL_NOT_FOUND",
            SkillError::AlreadyRegistered(_) => "SKILL_ALREADY_REGISTERED",
            SkillError::FileNotFound(_) => "SKILL_FILE_NOT_FOUND",
            SkillError::HashMismatch { .. } => "SKILL_HASH_MISMATCH",
            SkillError::Unverified(_) => "SKILL_UNVERIFIED",
            SkillError::PathTraversal(_) => "SKILL_PATH_TRAVERSAL",
            SkillError::Io(_) => "SKILL_IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SkillError>;
