use serde::{Deserialize, Serialize};

/// What kind of fact this is. Priority order for prompt injection:
/// identity > preference > decision > skill > knowledge >
/// conversation_summary > context (higher = included first).
///
/// Grounded on spec.md §3 "Fact" — expanded from the teacher's four-way
/// `MemoryCategory` (instruction/preference/fact/context) to the seven
/// categories the data model names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Preference,
    Identity,
    Knowledge,
    Skill,
    Context,
    ConversationSummary,
    Decision,
}

impl FactCategory {
    /// Priority rank for rendering order, lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            FactCategory::Identity => 0,
            FactCategory::Preference => 1,
            FactCategory::Decision => 2,
            FactCategory::Skill => 3,
            FactCategory::Knowledge => 4,
            FactCategory::ConversationSummary => 5,
            FactCategory::Context => 6,
        }
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FactCategory::Preference => "preference",
            FactCategory::Identity => "identity",
            FactCategory::Knowledge => "knowledge",
            FactCategory::Skill => "skill",
            FactCategory::Context => "context",
            FactCategory::ConversationSummary => "conversation_summary",
            FactCategory::Decision => "decision",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preference" => Ok(Self::Preference),
            "identity" => Ok(Self::Identity),
            "knowledge" => Ok(Self::Knowledge),
            "skill" => Ok(Self::Skill),
            "context" => Ok(Self::Context),
            "conversation_summary" => Ok(Self::ConversationSummary),
            "decision" => Ok(Self::Decision),
            other => Err(format!("unknown fact category: {other}")),
        }
    }
}

/// A single conversation thread, scoped to one channel (and optionally
/// one external user identity on that channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub channel: String,
    pub user_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub summary: Option<String>,
    pub token_count: i64,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
    pub token_count: i64,
    pub embedding_id: Option<String>,
}

/// A durable piece of knowledge about the user or the world, surfaced by
/// the context builder during prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub category: FactCategory,
    pub content: String,
    pub source_message_id: Option<i64>,
    /// 0.0-1.0 confidence score. Higher confidence wins on conflicting
    /// facts for the same (category, content-key) pair.
    pub confidence: f64,
    pub created_at: String,
    pub updated_at: String,
    pub embedding_id: Option<String>,
}

/// One LLM call's token/cost accounting row. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRow {
    pub id: i64,
    pub timestamp: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub channel: Option<String>,
    pub skill: Option<String>,
    pub conversation_id: Option<String>,
}

/// Rendered fact block ready for prompt injection, capped at
/// `MAX_CONTEXT_CHARS`. Cached per conversation for `CACHE_TTL_SECS`.
#[derive(Debug, Clone)]
pub struct RenderedContext {
    pub conversation_id: String,
    pub rendered: String,
    pub fact_count: usize,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregate counts, used by the gateway's `/health` and `/stats` surface.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    pub conversation_count: i64,
    pub message_count: i64,
    pub fact_count: i64,
    pub total_cost_usd: f64,
}
