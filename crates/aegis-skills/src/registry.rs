//! `SkillRegistry` — the only place in the process that knows skill
//! objects exist. The tool executor interacts with skills purely through
//! `get`, `execute`, and `tool_definitions`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, SkillError};
use crate::skill::{Skill, SkillMetadata, SkillResult};

#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
        }
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) -> Result<()> {
        let name = skill.metadata().name.clone();
        if self.skills.contains_key(&name) {
            return Err(SkillError::AlreadyRegistered(name));
        }
        self.skills.insert(name, skill);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<SkillResult> {
        let skill = self.get(name).ok_or_else(|| SkillError::NotFound(name.to_string()))?;
        Ok(skill.execute(args).await)
    }

    pub fn tool_definitions(&self) -> Vec<SkillMetadata> {
        self.skills.values().map(|s| s.metadata().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo(SkillMetadata);

    #[async_trait]
    impl Skill for Echo {
        fn metadata(&self) -> &SkillMetadata {
            &self.0
        }

        async fn execute(&self, args: Value) -> SkillResult {
            SkillResult::ok(args.to_string())
        }
    }

    fn echo_skill() -> Arc<dyn Skill> {
        Arc::new(Echo(SkillMetadata {
            name: "echo".to_string(),
            description: "echoes its input".to_string(),
            input_schema: Value::Null,
            required_actions: vec![],
        }))
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = SkillRegistry::new();
        registry.register(echo_skill()).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = SkillRegistry::new();
        registry.register(echo_skill()).unwrap();
        assert!(matches!(
            registry.register(echo_skill()),
            Err(SkillError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn execute_unknown_skill_errors() {
        let registry = SkillRegistry::new();
        let result = registry.execute("nope", Value::Null).await;
        assert!(matches!(result, Err(SkillError::NotFound(_))));
    }
}
