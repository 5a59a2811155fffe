//! Component C12: context builder — assembles the message array sent to
//! the LLM Router for a single turn.
//!
//! Five-step assembly, in order: (1) system prompt carrying the autonomy
//! level, the active provider/model, and a capability-availability block;
//! (2) an optional "relevant context from memory" block drawn from facts
//! and past messages; (3) an optional "related past conversations" block
//! drawn from ended conversations' summaries; (4) the recent message
//! window, chronological; (5) the new user message, always last. If the
//! assembled request would exceed the token budget, the oldest messages
//! in the middle window are dropped first — the system block and the
//! final user message are never dropped.
//!
//! Grounded on `original_source/src/agent/context_builder.py`.

use aegis_memory::{MemoryError, MemoryManager};
use aegis_core::types::AutonomyLevel;

use crate::provider::{Message, Role};

/// Output of a single turn's assembly — kept as a separate `system` string
/// rather than folded into `messages`, matching `ChatRequest`'s own split
/// (providers such as Anthropic reject a `system`-role entry inside the
/// messages array; it travels as a dedicated top-level field instead).
pub struct BuiltContext {
    pub system: String,
    pub messages: Vec<Message>,
}

/// Rough token estimate used for the trim rule — matches the original's
/// 4-characters-per-token heuristic rather than pulling in a real
/// tokenizer, since the trim only needs to be in the right ballpark.
const CHARS_PER_TOKEN: usize = 4;

/// With no vector store backend (explicit Non-goal), the similarity floors
/// a real implementation would apply to facts and past-conversation
/// summaries are approximated by the FTS5/substring fallback that
/// `MemoryManager::search_facts` and `search_conversations` already
/// perform — every hit either one returns is treated as having cleared it.

/// Everything the context builder needs to know about the turn besides
/// conversation history, which it reads from `MemoryManager` itself.
pub struct TurnContext<'a> {
    pub conversation_id: &'a str,
    pub channel: &'a str,
    pub provider_name: &'a str,
    pub model: &'a str,
    pub autonomy_level: AutonomyLevel,
    pub sandbox_enabled: bool,
    pub policy_enabled: bool,
    pub capability_block: &'a str,
    pub recent_window: usize,
    pub max_context_tokens: usize,
}

pub struct ContextBuilder<'a> {
    memory: &'a MemoryManager,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(memory: &'a MemoryManager) -> Self {
        Self { memory }
    }

    /// Assemble the full message array for one turn, ending with
    /// `new_user_message`.
    pub fn build(
        &self,
        turn: &TurnContext<'_>,
        new_user_message: &str,
    ) -> Result<BuiltContext, MemoryError> {
        // Step 1: system prompt.
        let mut system_blocks = vec![system_block(turn)];

        // Step 2: relevant context from memory (facts + prior messages).
        if let Some(block) = self.memory_context_block(turn.conversation_id, new_user_message)? {
            system_blocks.push(block);
        }

        // Step 3: related past conversations.
        if let Some(block) = self.related_conversations_block(turn.conversation_id, new_user_message)? {
            system_blocks.push(block);
        }
        let system = system_blocks.join("\n\n");

        // Step 4: recent conversation window, chronological.
        let history = self.memory.list_messages(turn.conversation_id, turn.recent_window, 0)?;
        let mut window: Vec<Message> = history
            .into_iter()
            .filter(|m| m.role == "user" || m.role == "assistant")
            .map(|m| Message {
                role: if m.role == "user" { Role::User } else { Role::Assistant },
                content: m.content,
            })
            .collect();

        // Step 5: new user message, always last.
        let new_message = Message {
            role: Role::User,
            content: new_user_message.to_string(),
        };

        trim_to_budget(&system, &mut window, &new_message, turn.max_context_tokens);

        let mut messages = window;
        messages.push(new_message);
        Ok(BuiltContext { system, messages })
    }

    fn memory_context_block(&self, conversation_id: &str, query: &str) -> Result<Option<String>, MemoryError> {
        let facts = self.memory.search_facts(query, 5)?;
        if facts.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("## Relevant context from memory\n");
        for fact in facts {
            out.push_str(&format!("- ({}) {}\n", fact.category, fact.content));
        }
        let _ = conversation_id; // reserved for a future per-conversation message search
        Ok(Some(out))
    }

    fn related_conversations_block(&self, conversation_id: &str, query: &str) -> Result<Option<String>, MemoryError> {
        let hits = self.memory.search_conversations(query, conversation_id, 3)?;
        if hits.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("## Related past conversations\n");
        for conv in hits {
            if let Some(summary) = conv.summary {
                out.push_str(&format!("- [{}] {}\n", conv.channel, summary));
            }
        }
        Ok(Some(out))
    }
}

fn system_block(turn: &TurnContext<'_>) -> String {
    format!(
        "You are running with autonomy level {} on channel '{}'.\n\
         Provider: {} | Model: {}\n\
         Sandbox: {} | Policy engine: {}\n\n\
         {}",
        turn.autonomy_level.0,
        turn.channel,
        turn.provider_name,
        turn.model,
        if turn.sandbox_enabled { "enabled" } else { "disabled" },
        if turn.policy_enabled { "enabled" } else { "disabled" },
        turn.capability_block,
    )
}

fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content.len() / CHARS_PER_TOKEN).sum()
}

/// Drop oldest entries from `window` until the full assembled request
/// (system text + window + the final user message) fits inside
/// `max_context_tokens`. Never touches `system` or `new_message`.
fn trim_to_budget(system: &str, window: &mut Vec<Message>, new_message: &Message, max_context_tokens: usize) {
    loop {
        let total = system.len() / CHARS_PER_TOKEN
            + estimate_tokens(window)
            + estimate_tokens(std::slice::from_ref(new_message));
        if total <= max_context_tokens || window.is_empty() {
            return;
        }
        window.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_memory::db::init_db;
    use rusqlite::Connection;

    fn memory() -> MemoryManager {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        MemoryManager::new(conn)
    }

    fn turn<'a>(capability_block: &'a str) -> TurnContext<'a> {
        TurnContext {
            conversation_id: "c1",
            channel: "gateway",
            provider_name: "anthropic",
            model: "claude-sonnet-4-6",
            autonomy_level: AutonomyLevel::DEFAULT,
            sandbox_enabled: true,
            policy_enabled: true,
            capability_block,
            recent_window: 20,
            max_context_tokens: 8_000,
        }
    }

    #[test]
    fn system_message_always_first_and_user_message_always_last() {
        let mem = memory();
        mem.create_conversation("c1", "gateway", None).unwrap();
        let builder = ContextBuilder::new(&mem);
        let t = turn("no tools available");
        let built = builder.build(&t, "hello").unwrap();

        assert!(built.system.contains("autonomy level"));
        let last = built.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "hello");
    }

    #[test]
    fn relevant_facts_are_surfaced_as_a_system_block() {
        let mem = memory();
        mem.create_conversation("c1", "gateway", None).unwrap();
        mem.add_fact(aegis_memory::FactCategory::Preference, "prefers dark mode", None, 0.9)
            .unwrap();
        let builder = ContextBuilder::new(&mem);
        let t = turn("no tools available");
        let built = builder.build(&t, "dark mode").unwrap();

        assert!(built.system.contains("prefers dark mode"));
    }

    #[test]
    fn trim_drops_oldest_window_messages_first() {
        let mem = memory();
        mem.create_conversation("c1", "gateway", None).unwrap();
        for i in 0..50 {
            mem.append_message("c1", "user", &format!("message number {i} padding padding padding"), 20)
                .unwrap();
        }
        let builder = ContextBuilder::new(&mem);
        let mut t = turn("no tools available");
        t.max_context_tokens = 50;
        let built = builder.build(&t, "final question").unwrap();

        // Trimmed window + final user message; the earliest appended
        // message should have been dropped to fit the budget.
        assert!(!built.messages.iter().any(|m| m.content.contains("message number 0 ")));
        assert_eq!(built.messages.last().unwrap().content, "final question");
    }
}
