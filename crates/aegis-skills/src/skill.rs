//! The `Skill` trait and its result/metadata types — component C9's
//! contract with the tool executor.
//!
//! Generalized from the teacher's `skynet-agent::tools::Tool` trait
//! (`name`/`description`/`input_schema`/`execute`), extended with
//! `metadata()` so the tool executor can derive a policy `ActionType`
//! without inspecting arguments.

use aegis_core::types::ActionType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative facts about a skill, known before it ever runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Action types this skill may perform, in priority order. The tool
    /// executor uses the first entry to pick a policy `ActionType`;
    /// empty means `ActionType::SkillExecute`.
    pub required_actions: Vec<ActionType>,
}

/// Outcome of running a skill. Callers switch on `success`; `output` is
/// always present (possibly empty), `error` only on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub metadata: Value,
}

impl SkillResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            metadata: Value::Null,
        }
    }

    pub fn ok_with_metadata(output: impl Into<String>, metadata: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            metadata,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            metadata: Value::Null,
        }
    }
}

/// Trait every skill (built-in or third-party) must implement.
#[async_trait]
pub trait Skill: Send + Sync {
    fn metadata(&self) -> &SkillMetadata;
    async fn execute(&self, args: Value) -> SkillResult;
}
