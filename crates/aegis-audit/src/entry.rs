use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the audit trail. Every action that passes through the
/// policy engine — allowed, denied, or pending approval — produces
/// exactly one entry, whether or not the underlying tool call ever runs.
///
/// Grounded on the `AuditLogger.log()` call sites in
/// `original_source/src/agent/tool_executor.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub resource: String,
    pub decision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    pub channel: String,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        actor: impl Into<String>,
        resource: impl Into<String>,
        decision: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            actor: actor.into(),
            resource: resource.into(),
            decision: decision.into(),
            policy: String::new(),
            detail: String::new(),
            channel: channel.into(),
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Replace any substring matching the shared sensitive-pattern set with
    /// a literal `[REDACTED]` marker so secrets never land on disk, even if
    /// a caller accidentally passes one through `resource` or `detail` —
    /// the rest of the field survives untouched.
    pub fn redact(mut self) -> Self {
        self.resource = aegis_security::patterns::redact_secrets(&self.resource);
        self.detail = aegis_security::patterns::redact_secrets(&self.detail);
        self
    }
}
