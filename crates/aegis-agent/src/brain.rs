//! Component C13: the agent brain — the single entry point that turns one
//! user message into a finished reply, driving the tool-call loop between
//! the LLM Router and the Tool Executor.
//!
//! `process_message` runs, in order: (1) open or create the conversation
//! and check today's spend against the configured daily budget; (2) build
//! the turn's message array via the Context Builder; (3) loop up to
//! `max_iterations` round-trips — send to the provider with the skill
//! registry's tool definitions attached, and for every tool call the
//! model requests, run it through the Tool Executor and feed the result
//! back as a `tool_result` block; (4) once the model replies with no
//! further tool calls (or the iteration cap is hit), scan the final text
//! for a leaked canary, persist both turns and a cost row, and return.
//!
//! Grounded on `original_source/src/agent/tool_executor.py`'s run loop and
//! the teacher's (now-removed) `tools::tool_loop::run_tool_loop` shape —
//! the fixed iteration cap (`MAX_ITERATIONS: usize = 25`) is replaced with
//! the configurable, default-8 `AgentConfig::max_iterations`.

use std::sync::Arc;

use aegis_core::config::AgentConfig;
use aegis_core::types::AutonomyLevel;
use aegis_memory::MemoryManager;
use aegis_security::CanarySystem;
use aegis_skills::SkillRegistry;
use serde_json::Value;

use crate::context::{ContextBuilder, TurnContext};
use crate::error::{BrainError, Result};
use crate::executor::ToolExecutor;
use crate::provider::{ChatRequest, ToolDefinition};
use crate::runtime::AgentRuntime;

/// Tokens requested for the model's reply on every round trip. Not user
/// configurable yet — there's no multi-model-family budget to trade off
/// against (single provider stack per spec.md Non-goals).
const MAX_TOKENS: u32 = 4_096;

/// Everything one finished turn produced, for the caller (the gateway) to
/// forward to the channel and append to its own transcript if it keeps one.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub response: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub tools_used: Vec<String>,
    /// Set when the turn was refused outright because today's spend has
    /// already reached the configured daily budget — `response` is then a
    /// fixed refusal message, not a model reply.
    pub budget_exceeded: bool,
}

pub struct AgentBrain {
    runtime: Arc<AgentRuntime>,
    memory: Arc<MemoryManager>,
    executor: Arc<ToolExecutor>,
    registry: Arc<SkillRegistry>,
    canary: Arc<CanarySystem>,
    autonomy_level: AutonomyLevel,
    sandbox_enabled: bool,
    policy_enabled: bool,
    max_iterations: u32,
    daily_budget_usd: f64,
    recent_window: usize,
    max_context_tokens: usize,
}

impl AgentBrain {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        memory: Arc<MemoryManager>,
        executor: Arc<ToolExecutor>,
        registry: Arc<SkillRegistry>,
        canary: Arc<CanarySystem>,
        config: &AgentConfig,
        autonomy_level: AutonomyLevel,
    ) -> Self {
        Self {
            runtime,
            memory,
            executor,
            registry,
            canary,
            autonomy_level,
            sandbox_enabled: true,
            policy_enabled: true,
            max_iterations: config.max_iterations,
            daily_budget_usd: config.daily_budget_usd,
            recent_window: 20,
            max_context_tokens: aegis_core::config::MAX_CONTEXT_TOKENS,
        }
    }

    pub async fn process_message(
        &self,
        conversation_id: Option<String>,
        channel: &str,
        user_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome> {
        let conversation_id = conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.memory
            .get_or_create_conversation(&conversation_id, channel, user_id)?;

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let spent_today = self.memory.aggregate_cost_for_date(&today)?;
        if spent_today >= self.daily_budget_usd {
            let refusal = "Today's spending budget has been reached; I can't make any more model calls until it rolls over.".to_string();
            self.memory.append_message(&conversation_id, "user", message, estimate_tokens(message))?;
            self.memory.append_message(&conversation_id, "assistant", &refusal, estimate_tokens(&refusal))?;
            return Ok(TurnOutcome {
                conversation_id,
                response: refusal,
                tokens_in: 0,
                tokens_out: 0,
                cost_usd: 0.0,
                tools_used: Vec::new(),
                budget_exceeded: true,
            });
        }

        let model = self.runtime.get_model().await;
        let provider_name = self.runtime.provider().name().to_string();
        let tool_defs = tool_definitions(&self.registry);
        let capability_block = self.capability_block(&tool_defs).await;

        let turn = TurnContext {
            conversation_id: &conversation_id,
            channel,
            provider_name: &provider_name,
            model: &model,
            autonomy_level: self.autonomy_level,
            sandbox_enabled: self.sandbox_enabled,
            policy_enabled: self.policy_enabled,
            capability_block: &capability_block,
            recent_window: self.recent_window,
            max_context_tokens: self.max_context_tokens,
        };
        let built = ContextBuilder::new(&self.memory).build(&turn, message)?;

        let mut raw_messages: Vec<Value> = built
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let mut tokens_in: u32 = 0;
        let mut tokens_out: u32 = 0;
        let mut tools_used: Vec<String> = Vec::new();
        let mut final_text = String::new();

        for iteration in 0..self.max_iterations {
            let req = ChatRequest {
                model: model.clone(),
                system: built.system.clone(),
                system_prompt: None,
                messages: Vec::new(),
                max_tokens: MAX_TOKENS,
                stream: false,
                thinking: None,
                tools: tool_defs.clone(),
                raw_messages: Some(raw_messages.clone()),
            };

            let resp = self.runtime.provider().send(&req).await?;
            tokens_in += resp.tokens_in;
            tokens_out += resp.tokens_out;

            if resp.tool_calls.is_empty() {
                final_text = resp.content;
                break;
            }

            let mut assistant_content = Vec::new();
            if !resp.content.is_empty() {
                assistant_content.push(serde_json::json!({"type": "text", "text": resp.content}));
            }
            for call in &resp.tool_calls {
                assistant_content.push(serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.input,
                }));
            }
            raw_messages.push(serde_json::json!({"role": "assistant", "content": assistant_content}));

            let mut tool_results = Vec::new();
            for call in &resp.tool_calls {
                let outcome = self.executor.execute(&call.name, call.input.clone(), channel).await;
                tools_used.push(call.name.clone());
                let content = if outcome.success {
                    outcome.output
                } else {
                    outcome.error
                };
                tool_results.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": content,
                    "is_error": !outcome.success,
                }));
            }
            raw_messages.push(serde_json::json!({"role": "user", "content": tool_results}));

            if iteration + 1 == self.max_iterations {
                final_text = "I hit the tool-call round-trip limit for this turn before finishing — ask me to continue if you'd like me to pick back up.".to_string();
            }
        }

        let alerts = self.canary.check_response(&final_text);
        if !alerts.is_empty() {
            tracing::warn!(count = alerts.len(), conversation_id = %conversation_id, "canary token surfaced in agent response");
        }

        self.memory.append_message(&conversation_id, "user", message, estimate_tokens(message))?;
        self.memory
            .append_message(&conversation_id, "assistant", &final_text, estimate_tokens(&final_text))?;

        let cost_usd = estimate_cost_usd(&model, tokens_in, tokens_out);
        self.memory.record_cost(&aegis_memory::CostRow {
            id: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            provider: provider_name,
            model: model.clone(),
            input_tokens: tokens_in as i64,
            output_tokens: tokens_out as i64,
            cost_usd,
            channel: Some(channel.to_string()),
            skill: None,
            conversation_id: Some(conversation_id.clone()),
        })?;

        Ok(TurnOutcome {
            conversation_id,
            response: final_text,
            tokens_in,
            tokens_out,
            cost_usd,
            tools_used,
            budget_exceeded: false,
        })
    }

    async fn capability_block(&self, tool_defs: &[ToolDefinition]) -> String {
        let persona = self.runtime.prompt().await.build();
        if tool_defs.is_empty() {
            return format!("{persona}\n\n## Available tools\nNone installed.");
        }
        let names: Vec<&str> = tool_defs.iter().map(|t| t.name.as_str()).collect();
        format!("{persona}\n\n## Available tools\n{}", names.join(", "))
    }
}

fn tool_definitions(registry: &SkillRegistry) -> Vec<ToolDefinition> {
    registry
        .tool_definitions()
        .into_iter()
        .map(|m| ToolDefinition {
            name: m.name,
            description: m.description,
            input_schema: m.input_schema,
        })
        .collect()
}

/// Same 4-characters-per-token heuristic the context builder's trim rule
/// uses, applied here to size the row persisted for a plain text turn.
fn estimate_tokens(text: &str) -> i64 {
    (text.len() / 4) as i64
}

/// Per-million-token USD rates for the models this build ships providers
/// for. Unrecognized models fall back to the Sonnet-tier rate rather than
/// reporting a free turn, so an unbudgeted provider can't silently bypass
/// `daily_budget_usd`.
fn estimate_cost_usd(model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
    let (in_per_million, out_per_million) = if model.contains("opus") {
        (15.0, 75.0)
    } else if model.contains("haiku") {
        (0.8, 4.0)
    } else if model.contains("gpt-4o-mini") {
        (0.15, 0.6)
    } else if model.contains("gpt-4o") || model.contains("gpt-5") {
        (2.5, 10.0)
    } else {
        (3.0, 15.0) // sonnet tier, also the default for unknown models
    };
    (tokens_in as f64 / 1_000_000.0) * in_per_million + (tokens_out as f64 / 1_000_000.0) * out_per_million
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::provider::{ChatResponse, LlmProvider, ProviderError, ToolCall};
    use aegis_audit::AuditLog;
    use aegis_memory::db::init_db;
    use aegis_security::{EgressFilter, PolicyEngine};
    use aegis_skills::{Skill, SkillMetadata, SkillResult};
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
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
                required_actions: vec![aegis_core::types::ActionType::SystemInfo],
            })
        }

        async fn execute(&self, args: Value) -> SkillResult {
            SkillResult::ok(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    /// Calls the `echo` tool exactly once, then answers plainly.
    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(ChatResponse {
                    content: String::new(),
                    model: "claude-sonnet-4-6".to_string(),
                    tokens_in: 100,
                    tokens_out: 20,
                    stop_reason: "tool_use".to_string(),
                    tool_calls: vec![ToolCall {
                        id: "call-1".to_string(),
                        name: "echo".to_string(),
                        input: serde_json::json!({"text": "hi"}),
                    }],
                })
            } else {
                Ok(ChatResponse {
                    content: "done".to_string(),
                    model: "claude-sonnet-4-6".to_string(),
                    tokens_in: 50,
                    tokens_out: 10,
                    stop_reason: "end_turn".to_string(),
                    tool_calls: Vec::new(),
                })
            }
        }
    }

    fn brain() -> AgentBrain {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let memory = Arc::new(MemoryManager::new(conn));

        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let registry = Arc::new(registry);

        let audit_dir = tempdir().unwrap();
        let executor = Arc::new(ToolExecutor::new(
            registry.clone(),
            Arc::new(PolicyEngine::new(AutonomyLevel::MAX)),
            Arc::new(CanarySystem::new()),
            Arc::new(EgressFilter::new()),
            Arc::new(AuditLog::new(audit_dir.path()).unwrap()),
        ));

        let runtime = Arc::new(AgentRuntime::new(
            Box::new(ScriptedProvider { calls: AtomicUsize::new(0) }),
            PromptBuilder::load(None, None),
            "claude-sonnet-4-6".to_string(),
        ));

        let config = AgentConfig {
            model: "claude-sonnet-4-6".to_string(),
            max_iterations: 8,
            daily_budget_usd: 10.0,
        };

        AgentBrain::new(
            runtime,
            memory,
            executor,
            registry,
            Arc::new(CanarySystem::new()),
            &config,
            AutonomyLevel::MAX,
        )
    }

    #[tokio::test]
    async fn runs_a_tool_call_then_returns_the_final_answer() {
        let brain = brain();
        let outcome = brain
            .process_message(None, "gateway", None, "please echo hi")
            .await
            .unwrap();

        assert_eq!(outcome.response, "done");
        assert_eq!(outcome.tools_used, vec!["echo".to_string()]);
        assert!(!outcome.budget_exceeded);
        assert_eq!(outcome.tokens_in, 150);
        assert_eq!(outcome.tokens_out, 30);
        assert!(outcome.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn reusing_the_returned_conversation_id_continues_the_same_thread() {
        let brain = brain();
        let first = brain.process_message(None, "gateway", None, "hello").await.unwrap();
        let second = brain
            .process_message(Some(first.conversation_id.clone()), "gateway", None, "again")
            .await
            .unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);

        let history = brain.memory.list_messages(&first.conversation_id, 50, 0).unwrap();
        // two turns, each contributing a user + assistant message
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn exhausted_daily_budget_short_circuits_before_calling_the_provider() {
        let brain = brain();
        brain
            .memory
            .record_cost(&aegis_memory::CostRow {
                id: 0,
                timestamp: chrono::Utc::now().to_rfc3339(),
                provider: "scripted".to_string(),
                model: "claude-sonnet-4-6".to_string(),
                input_tokens: 1,
                output_tokens: 1,
                cost_usd: 999.0,
                channel: None,
                skill: None,
                conversation_id: None,
            })
            .unwrap();

        let outcome = brain.process_message(None, "gateway", None, "hello").await.unwrap();
        assert!(outcome.budget_exceeded);
        assert_eq!(outcome.tokens_in, 0);
    }

    #[test]
    fn unknown_models_are_priced_at_the_sonnet_tier_rather_than_free() {
        let known = estimate_cost_usd("claude-sonnet-4-6", 1_000_000, 1_000_000);
        let unknown = estimate_cost_usd("some-future-model", 1_000_000, 1_000_000);
        assert_eq!(known, unknown);
        assert!(unknown > 0.0);
    }
}
