use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("input rejected: {0}")]
    InvalidInput(String),

    #[error("action denied by policy: {0}")]
    PolicyDenied(String),

    #[error("action requires user approval: {0}")]
    PolicyAskUser(String),

    #[error("egress blocked: {0}")]
    EgressBlocked(String),

    #[error("canary triggered: {0}")]
    CanaryTriggered(String),

    #[error("invalid regex pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl SecurityError {
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::InvalidInput(_) => "SECURITY_INVALID_INPUT",
            SecurityError::PolicyDenied(_) => "SECURITY_POLICY_DENIED",
            SecurityError::PolicyAskUser(_) => "SECURITY_POLICY_ASK_USER",
            SecurityError::EgressBlocked(_) => "SECURITY_EGRESS_BLOCKED",
            SecurityError::CanaryTriggered(_) => "SECURITY_CANARY_TRIGGERED",
            SecurityError::Pattern(_) => "SECURITY_BAD_PATTERN",
        }
    }
}

pub type Result<T> = std::result::Result<T, SecurityError>;
