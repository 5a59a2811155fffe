//! Component C5: deterministic policy engine.
//!
//! Every action the agent wants to take — read a file, run a shell
//! command, hit the network — goes through `PolicyEngine::check` before
//! it reaches the sandbox. Default is deny: a policy must explicitly
//! ALLOW or ASK_USER, otherwise the action is refused.
//!
//! Grounded on `original_source/src/security/policy_engine.py`.

use std::collections::HashMap;

use aegis_core::types::{ActionType, AutonomyLevel};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use aegis_core::config::SENSITIVE_PATHS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    AskUser,
}

#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub action: ActionType,
    pub resource: String,
    pub autonomy_level: AutonomyLevel,
    pub channel: String,
    pub metadata: HashMap<String, Value>,
}

impl PolicyContext {
    pub fn new(action: ActionType, resource: impl Into<String>) -> Self {
        Self {
            action,
            resource: resource.into(),
            autonomy_level: AutonomyLevel::DEFAULT,
            channel: "gateway".to_string(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub decision: Decision,
    pub reason: String,
    pub policy_name: &'static str,
}

/// A single rule in the policy pipeline. Returns `None` when it has
/// nothing to say about this context, letting the next policy decide.
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult>;
}

/// Deterministic action authorizer. Policies run in order; the first one
/// to return a result wins. If none match, the action is denied.
pub struct PolicyEngine {
    autonomy_level: AutonomyLevel,
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyEngine {
    pub fn new(autonomy_level: AutonomyLevel) -> Self {
        Self {
            autonomy_level,
            policies: vec![
                Box::new(HardDenyPolicy),
                Box::new(AutonomyPolicy),
                Box::new(FileAccessPolicy),
                Box::new(NetworkPolicy),
                Box::new(ShellPolicy),
            ],
        }
    }

    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn check(&self, mut ctx: PolicyContext) -> PolicyResult {
        ctx.autonomy_level = self.autonomy_level;

        for policy in &self.policies {
            if let Some(result) = policy.evaluate(&ctx) {
                info!(
                    action = ctx.action.as_str(),
                    resource = %truncate_for_log(&ctx.resource),
                    decision = ?result.decision,
                    policy = result.policy_name,
                    "policy_decision"
                );
                return result;
            }
        }

        let result = PolicyResult {
            decision: Decision::Deny,
            reason: "No policy matched. Default: deny.".to_string(),
            policy_name: "default_deny",
        };
        info!(
            action = ctx.action.as_str(),
            resource = %truncate_for_log(&ctx.resource),
            decision = ?result.decision,
            policy = result.policy_name,
            "policy_decision"
        );
        result
    }
}

fn truncate_for_log(s: &str) -> &str {
    let max = 100;
    if s.len() > max {
        &s[..max]
    } else {
        s
    }
}

static FORBIDDEN_COMMANDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)rm\s+-rf\s+/",
        r"(?i)rm\s+-rf\s+~",
        r"(?i)mkfs\.",
        r"(?i)dd\s+if=.*of=/dev/",
        r"(?i)chmod\s+-R\s+777\s+/",
        r":\(\)\s*\{\s*:\|:&\s*\};:",
        r">\s*/dev/sd",
        r"(?i)curl.*\|\s*(bash|sh|sudo)",
        r"(?i)wget.*\|\s*(bash|sh|sudo)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

struct HardDenyPolicy;

impl Policy for HardDenyPolicy {
    fn name(&self) -> &'static str {
        "hard_deny"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult> {
        if matches!(
            ctx.action,
            ActionType::FileRead | ActionType::FileWrite | ActionType::FileDelete
        ) {
            let resource = ctx.resource.to_lowercase();
            for sensitive in SENSITIVE_PATHS {
                if resource.contains(sensitive) {
                    return Some(PolicyResult {
                        decision: Decision::Deny,
                        reason: format!("Access to sensitive path '{sensitive}' is forbidden."),
                        policy_name: self.name(),
                    });
                }
            }
        }

        if ctx.action == ActionType::ShellExec {
            for pattern in FORBIDDEN_COMMANDS.iter() {
                if pattern.is_match(&ctx.resource) {
                    return Some(PolicyResult {
                        decision: Decision::Deny,
                        reason: format!(
                            "Dangerous command blocked: matches pattern '{}'",
                            pattern.as_str()
                        ),
                        policy_name: self.name(),
                    });
                }
            }
        }

        if ctx.action == ActionType::CredentialAccess {
            return Some(PolicyResult {
                decision: Decision::AskUser,
                reason: "Credential access always requires user approval.".to_string(),
                policy_name: self.name(),
            });
        }

        None
    }
}

struct AutonomyPolicy;

impl Policy for AutonomyPolicy {
    fn name(&self) -> &'static str {
        "autonomy"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult> {
        let level = ctx.autonomy_level.0;
        let ask = |reason: &str| {
            Some(PolicyResult {
                decision: Decision::AskUser,
                reason: reason.to_string(),
                policy_name: self.name(),
            })
        };
        let allow = |reason: &str| {
            Some(PolicyResult {
                decision: Decision::Allow,
                reason: reason.to_string(),
                policy_name: self.name(),
            })
        };

        match level {
            0 => ask("Autonomy level 0: user approval required for all actions."),
            1 => {
                if matches!(
                    ctx.action,
                    ActionType::FileRead | ActionType::MemoryRead | ActionType::SystemInfo
                ) {
                    allow("Autonomy level 1: read actions allowed.")
                } else {
                    ask("Autonomy level 1: write/exec actions require approval.")
                }
            }
            2 => {
                let safe = matches!(
                    ctx.action,
                    ActionType::FileRead
                        | ActionType::MemoryRead
                        | ActionType::MemoryWrite
                        | ActionType::SystemInfo
                        | ActionType::FileWrite
                );
                if safe {
                    allow("Autonomy level 2: safe action allowed.")
                } else if matches!(
                    ctx.action,
                    ActionType::ShellExec
                        | ActionType::NetworkRequest
                        | ActionType::NetworkDownload
                        | ActionType::EmailSend
                ) {
                    ask("Autonomy level 2: shell/network actions require approval.")
                } else {
                    None
                }
            }
            3 => {
                if matches!(
                    ctx.action,
                    ActionType::FileDelete | ActionType::ShellExec | ActionType::EmailSend
                ) {
                    ask("Autonomy level 3: destructive actions require approval.")
                } else {
                    allow("Autonomy level 3: non-destructive action allowed.")
                }
            }
            _ => {
                if ctx.action == ActionType::CredentialAccess {
                    ask("Autonomy level 4: credential access requires approval.")
                } else {
                    allow("Autonomy level 4: action allowed.")
                }
            }
        }
    }
}

struct FileAccessPolicy;

impl Policy for FileAccessPolicy {
    fn name(&self) -> &'static str {
        "file_access"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult> {
        if !matches!(
            ctx.action,
            ActionType::FileRead | ActionType::FileWrite | ActionType::FileDelete
        ) {
            return None;
        }

        if ctx.action == ActionType::FileDelete {
            return Some(PolicyResult {
                decision: Decision::AskUser,
                reason: "File deletion requires user confirmation.".to_string(),
                policy_name: self.name(),
            });
        }

        const SYSTEM_PATHS: &[&str] = &["/etc/", "/usr/", "/bin/", "/sbin/", "c:\\windows\\", "c:\\program files"];
        let resource = ctx.resource.to_lowercase();
        for sys_path in SYSTEM_PATHS {
            if resource.starts_with(sys_path) {
                return Some(PolicyResult {
                    decision: Decision::Deny,
                    reason: format!("Access to system path '{sys_path}' is restricted."),
                    policy_name: self.name(),
                });
            }
        }

        None
    }
}

struct NetworkPolicy;

impl Policy for NetworkPolicy {
    fn name(&self) -> &'static str {
        "network"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult> {
        if !matches!(ctx.action, ActionType::NetworkRequest | ActionType::NetworkDownload) {
            return None;
        }

        const BLOCKED_DOMAINS: &[&str] = &[
            "localhost",
            "127.0.0.1",
            "0.0.0.0",
            "169.254.169.254",
            "metadata.google.internal",
        ];

        let resource = ctx.resource.to_lowercase();
        for blocked in BLOCKED_DOMAINS {
            if resource.contains(blocked) {
                return Some(PolicyResult {
                    decision: Decision::Deny,
                    reason: format!("Access to '{blocked}' is blocked (SSRF prevention)."),
                    policy_name: self.name(),
                });
            }
        }

        None
    }
}

static PROMPT_COMMANDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)sudo\s+",
        r"(?i)pip\s+install",
        r"(?i)npm\s+install",
        r"(?i)apt\s+install",
        r"(?i)brew\s+install",
        r"(?i)docker\s+",
        r"(?i)git\s+push",
        r"(?i)git\s+force",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

struct ShellPolicy;

impl Policy for ShellPolicy {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyResult> {
        if ctx.action != ActionType::ShellExec {
            return None;
        }

        for pattern in PROMPT_COMMANDS.iter() {
            if pattern.is_match(&ctx.resource) {
                return Some(PolicyResult {
                    decision: Decision::AskUser,
                    reason: format!("Command matches prompt pattern: '{}'", pattern.as_str()),
                    policy_name: self.name(),
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_key_access_is_hard_denied_regardless_of_autonomy() {
        let engine = PolicyEngine::new(AutonomyLevel(4));
        let ctx = PolicyContext::new(ActionType::FileRead, "/home/user/.ssh/id_rsa");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_name, "hard_deny");
    }

    #[test]
    fn rm_rf_root_is_hard_denied() {
        let engine = PolicyEngine::new(AutonomyLevel(4));
        let ctx = PolicyContext::new(ActionType::ShellExec, "rm -rf /");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn credential_access_always_asks() {
        let engine = PolicyEngine::new(AutonomyLevel(4));
        let ctx = PolicyContext::new(ActionType::CredentialAccess, "github_token");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::AskUser);
    }

    #[test]
    fn autonomy_level_0_asks_for_everything() {
        let engine = PolicyEngine::new(AutonomyLevel(0));
        let ctx = PolicyContext::new(ActionType::FileRead, "/tmp/foo.txt");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::AskUser);
    }

    #[test]
    fn autonomy_level_2_allows_safe_read() {
        let engine = PolicyEngine::new(AutonomyLevel(2));
        let ctx = PolicyContext::new(ActionType::FileRead, "/tmp/foo.txt");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn autonomy_level_2_asks_for_shell() {
        let engine = PolicyEngine::new(AutonomyLevel(2));
        let ctx = PolicyContext::new(ActionType::ShellExec, "ls -la");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::AskUser);
    }

    #[test]
    fn ssrf_metadata_network_is_denied() {
        let engine = PolicyEngine::new(AutonomyLevel(4));
        let ctx = PolicyContext::new(ActionType::NetworkRequest, "http://169.254.169.254/");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn sudo_always_asks_under_shell_policy() {
        let engine = PolicyEngine::new(AutonomyLevel(4));
        let ctx = PolicyContext::new(ActionType::ShellExec, "sudo apt update");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::AskUser);
        assert_eq!(result.policy_name, "shell");
    }

    #[test]
    fn unmatched_action_defaults_to_deny() {
        let mut engine = PolicyEngine::new(AutonomyLevel(2));
        engine.policies.clear();
        let ctx = PolicyContext::new(ActionType::BrowserNavigate, "https://example.com");
        let result = engine.check(ctx);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_name, "default_deny");
    }
}
