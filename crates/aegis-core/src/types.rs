use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies which agent instance handles a session.
///
/// Aegis runs a single local agent per machine (no multi-user tenancy — see
/// `spec.md` Non-goals), so this mostly exists to keep the conversation-key
/// layout parseable and future-proof, the way the teacher's session keys are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The default single-agent setup uses "main".
    pub fn main() -> Self {
        Self("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structured, parseable conversation key.
///
/// Format: `agent:{agent_id}:{session_name}` — e.g. the loopback gateway's
/// default conversation is `agent:main:default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(agent_id: &AgentId, session: &str) -> Self {
        Self(format!("agent:{}:{}", agent_id, session))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Autonomy level gating how much the policy engine allows without asking
/// for confirmation. See `aegis-security::policy::AutonomyPolicy`.
///
/// - `0` — confirm everything.
/// - `1` — auto-allow reads.
/// - `2` — auto-allow reads + writes, ask before shell/network/email (default).
/// - `3` — auto-allow everything except destructive ops.
/// - `4` — auto-allow everything except credential access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AutonomyLevel(pub u8);

impl AutonomyLevel {
    pub const MIN: AutonomyLevel = AutonomyLevel(0);
    pub const MAX: AutonomyLevel = AutonomyLevel(4);
    pub const DEFAULT: AutonomyLevel = AutonomyLevel(2);

    pub fn clamp(self) -> Self {
        AutonomyLevel(self.0.min(Self::MAX.0))
    }
}

impl Default for AutonomyLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Every kind of action the policy engine can be asked to evaluate.
///
/// Grounded verbatim on `original_source/src/security/policy_engine.py::ActionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    FileRead,
    FileWrite,
    FileDelete,
    ShellExec,
    NetworkRequest,
    NetworkDownload,
    SkillExecute,
    MemoryRead,
    MemoryWrite,
    CredentialAccess,
    SystemInfo,
    BrowserNavigate,
    EmailSend,
    MessageSend,
}

impl ActionType {
    /// Wire string used in audit entries and tracing fields, matching the
    /// original's `"file:read"`-style action strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::FileRead => "file:read",
            ActionType::FileWrite => "file:write",
            ActionType::FileDelete => "file:delete",
            ActionType::ShellExec => "shell:exec",
            ActionType::NetworkRequest => "network:request",
            ActionType::NetworkDownload => "network:download",
            ActionType::SkillExecute => "skill:execute",
            ActionType::MemoryRead => "memory:read",
            ActionType::MemoryWrite => "memory:write",
            ActionType::CredentialAccess => "credential:access",
            ActionType::SystemInfo => "system:info",
            ActionType::BrowserNavigate => "browser:navigate",
            ActionType::EmailSend => "email:send",
            ActionType::MessageSend => "message:send",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
