use tokio::sync::RwLock;

use crate::prompt::PromptBuilder;
use crate::provider::LlmProvider;

/// Central agent runtime — holds the LLM provider and prompt builder.
/// Shared across all connections via Arc in AppState.
///
/// The teacher's runtime also carried an optional `HookEngine` for LLM
/// observability events and `chat*` convenience wrappers around a single
/// user turn; both are gone here. Observability hooks have no counterpart
/// in this spec, and the agent brain (`brain.rs`) needs to rebuild the
/// request on every tool-loop iteration rather than once per turn, so it
/// talks to `provider()`/`prompt()` directly instead of going through a
/// one-shot `chat` helper.
pub struct AgentRuntime {
    provider: Box<dyn LlmProvider>,
    prompt: RwLock<PromptBuilder>,
    default_model: RwLock<String>,
}

impl AgentRuntime {
    pub fn new(provider: Box<dyn LlmProvider>, prompt: PromptBuilder, default_model: String) -> Self {
        Self {
            provider,
            prompt: RwLock::new(prompt),
            default_model: RwLock::new(default_model),
        }
    }

    /// Get the current default model name.
    pub async fn get_model(&self) -> String {
        self.default_model.read().await.clone()
    }

    /// Change the default model at runtime. Returns the previous model.
    pub async fn set_model(&self, model: String) -> String {
        let mut guard = self.default_model.write().await;
        std::mem::replace(&mut *guard, model)
    }

    /// Access the LLM provider directly.
    pub fn provider(&self) -> &dyn LlmProvider {
        &*self.provider
    }

    /// Access the prompt builder (async read lock).
    pub async fn prompt(&self) -> tokio::sync::RwLockReadGuard<'_, PromptBuilder> {
        self.prompt.read().await
    }
}
