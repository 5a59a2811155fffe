//! Component C10: tool executor — the fixed seven-step pipeline every
//! skill invocation passes through, in order: lookup, action mapping,
//! policy check, execution, egress DLP on the output, canary injection,
//! and audit of the outcome. No step may be skipped or reordered.
//!
//! Grounded on `original_source/src/agent/tool_executor.py`.

use std::sync::Arc;

use aegis_audit::{AuditEntry, AuditLog};
use aegis_core::types::ActionType;
use aegis_security::{CanarySystem, Decision, EgressFilter, PolicyContext, PolicyEngine};
use aegis_skills::SkillRegistry;
use serde_json::Value;

const REDACTED_OUTPUT_NOTICE: &str = "[output withheld: sensitive data detected by egress filter]";

/// What the executor decided, and what (if anything) the caller should
/// show the model or the user.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub decision: Decision,
    pub success: bool,
    pub output: String,
    pub error: String,
    pub name: String,
    pub args: Value,
}

impl ExecutionOutcome {
    fn deny(name: &str, args: Value, reason: String) -> Self {
        Self {
            decision: Decision::Deny,
            success: false,
            output: String::new(),
            error: reason,
            name: name.to_string(),
            args,
        }
    }

    fn ask_user(name: &str, args: Value, reason: String) -> Self {
        Self {
            decision: Decision::AskUser,
            success: false,
            output: String::new(),
            error: reason,
            name: name.to_string(),
            args,
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<SkillRegistry>,
    policy: Arc<PolicyEngine>,
    canary: Arc<CanarySystem>,
    egress: Arc<EgressFilter>,
    audit: Arc<AuditLog>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<SkillRegistry>,
        policy: Arc<PolicyEngine>,
        canary: Arc<CanarySystem>,
        egress: Arc<EgressFilter>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            policy,
            canary,
            egress,
            audit,
        }
    }

    pub async fn execute(&self, name: &str, args: Value, channel: &str) -> ExecutionOutcome {
        // Step 1: lookup.
        let Some(skill) = self.registry.get(name) else {
            self.log(name, "unknown", "deny", channel, "");
            return ExecutionOutcome::deny(name, args, "Unknown tool".to_string());
        };

        // Step 2: action mapping.
        let metadata = skill.metadata();
        let action_type = metadata
            .required_actions
            .first()
            .copied()
            .unwrap_or(ActionType::SkillExecute);
        let resource = derive_resource(name, &args);

        // Step 3: policy check.
        let mut ctx = PolicyContext::new(action_type, resource.clone());
        ctx.channel = channel.to_string();
        let policy_result = self.policy.check(ctx);

        match policy_result.decision {
            Decision::Deny => {
                self.log(name, &resource, "deny", channel, &policy_result.reason);
                return ExecutionOutcome::deny(name, args, policy_result.reason);
            }
            Decision::AskUser => {
                self.log(name, &resource, "ask_user", channel, &policy_result.reason);
                return ExecutionOutcome::ask_user(name, args, policy_result.reason);
            }
            Decision::Allow => {}
        }

        // Step 4: execute.
        let result = skill.execute(args.clone()).await;
        if !result.success {
            self.log(name, &resource, "error", channel, &result.error);
            return ExecutionOutcome {
                decision: Decision::Allow,
                success: false,
                output: result.output,
                error: result.error,
                name: name.to_string(),
                args,
            };
        }

        // Step 5: egress DLP on the output.
        let egress_decision = self.egress.check_data(&result.output);
        let output = if egress_decision.allowed {
            result.output
        } else {
            REDACTED_OUTPUT_NOTICE.to_string()
        };

        // Step 6: canary injection.
        let (wrapped, _token) = self.canary.inject_tool_output(&output);

        // Step 7: audit success.
        self.log(name, &resource, "allow", channel, &format!("success={}", result.success));

        ExecutionOutcome {
            decision: Decision::Allow,
            success: result.success,
            output: wrapped,
            error: String::new(),
            name: name.to_string(),
            args,
        }
    }

    fn log(&self, name: &str, resource: &str, decision: &str, channel: &str, detail: &str) {
        let entry = AuditEntry::new(format!("skill:{name}"), "agent", resource, decision, channel)
            .with_detail(detail);
        if let Err(e) = self.audit.log(entry) {
            tracing::warn!(error = %e, "failed to write audit entry");
        }
    }
}

/// Build a compact, loggable resource string from the skill's arguments —
/// preferring the most identifying field a skill typically names its
/// primary target with, falling back to the whole argument object.
fn derive_resource(name: &str, args: &Value) -> String {
    for key in ["path", "command", "url", "query"] {
        if let Some(v) = args.get(key).and_then(|v| v.as_str()) {
            return v.to_string();
        }
    }
    if args.is_null() || (args.is_object() && args.as_object().map(|m| m.is_empty()).unwrap_or(false)) {
        return name.to_string();
    }
    args.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::AutonomyLevel;
    use aegis_skills::{Skill, SkillMetadata, SkillResult};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct Echo;

    #[async_trait]
    impl Skill for Echo {
        fn metadata(&self) -> &SkillMetadata {
            static META: std::sync::OnceLock<SkillMetadata> = std::sync::OnceLock::new();
            META.get_or_init(|| SkillMetadata {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                input_schema: Value::Null,
                required_actions: vec![ActionType::FileRead],
            })
        }

        async fn execute(&self, args: Value) -> SkillResult {
            SkillResult::ok(args.get("path").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    fn executor(autonomy: AutonomyLevel) -> ToolExecutor {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let dir = tempdir().unwrap();
        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(PolicyEngine::new(autonomy)),
            Arc::new(CanarySystem::new()),
            Arc::new(EgressFilter::new()),
            Arc::new(AuditLog::new(dir.path()).unwrap()),
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_denied() {
        let exec = executor(AutonomyLevel::MAX);
        let outcome = exec.execute("nope", Value::Null, "gateway").await;
        assert_eq!(outcome.decision, Decision::Deny);
        assert!(!outcome.success);
        assert_eq!(outcome.error, "Unknown tool");
    }

    #[tokio::test]
    async fn sensitive_path_read_is_denied_regardless_of_autonomy() {
        let exec = executor(AutonomyLevel::MAX);
        let args = serde_json::json!({"path": "/home/user/.ssh/id_rsa"});
        let outcome = exec.execute("echo", args, "gateway").await;
        assert_eq!(outcome.decision, Decision::Deny);
    }

    #[tokio::test]
    async fn allowed_read_wraps_output_with_a_canary() {
        let exec = executor(AutonomyLevel::MAX);
        let args = serde_json::json!({"path": "/tmp/notes.txt"});
        let outcome = exec.execute("echo", args, "gateway").await;
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.success);
        assert!(outcome.output.contains("/tmp/notes.txt"));
        assert_ne!(outcome.output, "/tmp/notes.txt", "canary wrapping should extend the output");
    }

    #[tokio::test]
    async fn low_autonomy_asks_user_instead_of_executing() {
        let exec = executor(AutonomyLevel(0));
        let args = serde_json::json!({"path": "/tmp/notes.txt"});
        let outcome = exec.execute("echo", args.clone(), "gateway").await;
        assert_eq!(outcome.decision, Decision::AskUser);
        assert_eq!(outcome.args, args);
    }
}
