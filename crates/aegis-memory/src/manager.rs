use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::types::*;

/// Maximum rendered context size in characters (~1500 tokens).
const MAX_CONTEXT_CHARS: usize = 6000;
/// Cache entries expire after 5 minutes.
const CACHE_TTL_SECS: i64 = 300;
/// Maximum cache entries before eviction.
const MAX_CACHE_ENTRIES: usize = 256;

/// Manages conversations, messages, facts, and cost accounting.
///
/// Thread-safe: wraps the SQLite connection in a `Mutex` and keeps an
/// in-memory TTL cache of rendered fact contexts, generalized from the
/// teacher's per-user `UserContext` cache to per-conversation RAG context.
pub struct MemoryManager {
    db: Mutex<Connection>,
    cache: Mutex<HashMap<String, RenderedContext>>,
}

impl MemoryManager {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            cache: Mutex::new(HashMap::new()),
        }
    }

    // --- Conversations ---------------------------------------------------

    pub fn create_conversation(&self, id: &str, channel: &str, user_id: Option<&str>) -> Result<Conversation> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO conversations (id, channel, user_id, started_at, token_count)
             VALUES (?1, ?2, ?3, ?4, 0)",
            rusqlite::params![id, channel, user_id, now],
        )?;
        Ok(Conversation {
            id: id.to_string(),
            channel: channel.to_string(),
            user_id: user_id.map(String::from),
            started_at: now,
            ended_at: None,
            summary: None,
            token_count: 0,
        })
    }

    /// Return the conversation at `id` if one is open, or create it.
    ///
    /// Mirrors the teacher's `SessionManager::get_or_create` upsert pattern:
    /// callers key `id` with `aegis_sessions::ConversationKey::format()` so
    /// the same channel/user binding always resolves to the same open
    /// conversation until it is explicitly ended.
    pub fn get_or_create_conversation(&self, id: &str, channel: &str, user_id: Option<&str>) -> Result<Conversation> {
        if let Ok(conv) = self.get_conversation(id) {
            return Ok(conv);
        }
        self.create_conversation(id, channel, user_id)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, channel, user_id, started_at, ended_at, summary, token_count
             FROM conversations WHERE id = ?1",
            rusqlite::params![id],
            row_to_conversation,
        )
        .map_err(|_| MemoryError::ConversationNotFound(id.to_string()))
    }

    /// Search ended conversations' summaries by substring, most recent
    /// first — backs the Context Builder's "related past conversations"
    /// step. Conversations without a summary (never ended, or ended with
    /// no extracted summary) are not candidates.
    pub fn search_conversations(&self, query: &str, exclude_id: &str, limit: usize) -> Result<Vec<Conversation>> {
        let db = self.db.lock().unwrap();
        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));
        let mut stmt = db.prepare(
            "SELECT id, channel, user_id, started_at, ended_at, summary, token_count
             FROM conversations
             WHERE summary IS NOT NULL AND summary LIKE ?1 AND id != ?2
             ORDER BY started_at DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, exclude_id, limit], row_to_conversation)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn end_conversation(&self, id: &str, summary: Option<&str>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE conversations SET ended_at = ?1, summary = ?2 WHERE id = ?3",
            rusqlite::params![now, summary, id],
        )?;
        if changed == 0 {
            return Err(MemoryError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Messages ----------------------------------------------------------

    /// Append a message and roll its token count into the conversation total.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        token_count: i64,
    ) -> Result<Message> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO messages (conversation_id, role, content, timestamp, token_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![conversation_id, role, content, now, token_count],
        )?;
        let id = db.last_insert_rowid();
        db.execute(
            "UPDATE conversations SET token_count = token_count + ?1 WHERE id = ?2",
            rusqlite::params![token_count, conversation_id],
        )?;
        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: now,
            token_count,
            embedding_id: None,
        })
    }

    /// List messages for a conversation in ascending timestamp order,
    /// paginated with `limit`/`offset`.
    pub fn list_messages(&self, conversation_id: &str, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, role, content, timestamp, token_count, embedding_id
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![conversation_id, limit, offset], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // --- Facts ---------------------------------------------------------------

    /// Store or update a fact. Matches on (category, content) for
    /// dedup; higher confidence wins on conflict, syncing the FTS5 index.
    pub fn add_fact(
        &self,
        category: FactCategory,
        content: &str,
        source_message_id: Option<i64>,
        confidence: f64,
    ) -> Result<Fact> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let cat = category.to_string();

        let existing: Option<(i64, f64)> = db
            .query_row(
                "SELECT id, confidence FROM facts WHERE category = ?1 AND content = ?2",
                rusqlite::params![cat, content],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let id = match existing {
            Some((id, old_conf)) if confidence < old_conf => {
                debug!(category = %cat, old_conf, new_conf = confidence, "skipping add_fact: existing confidence is higher");
                id
            }
            Some((id, _)) => {
                db.execute(
                    "UPDATE facts SET confidence = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![confidence, now, id],
                )?;
                id
            }
            None => {
                db.execute(
                    "INSERT INTO facts (category, content, source_message_id, confidence, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    rusqlite::params![cat, content, source_message_id, confidence, now],
                )?;
                let id = db.last_insert_rowid();
                db.execute(
                    "INSERT INTO facts_fts(rowid, content) VALUES (?1, ?2)",
                    rusqlite::params![id, content],
                )?;
                id
            }
        };

        self.invalidate_all_cache();

        db.query_row(
            "SELECT id, category, content, source_message_id, confidence, created_at, updated_at, embedding_id
             FROM facts WHERE id = ?1",
            rusqlite::params![id],
            row_to_fact,
        )
        .map_err(MemoryError::Database)
    }

    pub fn get_facts_by_category(&self, category: FactCategory) -> Result<Vec<Fact>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, category, content, source_message_id, confidence, created_at, updated_at, embedding_id
             FROM facts WHERE category = ?1 ORDER BY confidence DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![category.to_string()], row_to_fact)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Full-text search over fact content, falling back to substring
    /// matching when the FTS5 query syntax itself is malformed.
    pub fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<Fact>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT f.id, f.category, f.content, f.source_message_id, f.confidence,
                    f.created_at, f.updated_at, f.embedding_id
             FROM facts f
             JOIN facts_fts ft ON f.id = ft.rowid
             WHERE facts_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![query, limit], row_to_fact);
        match rows {
            Ok(rows) => Ok(rows.filter_map(|r| r.ok()).collect()),
            Err(_) => self.search_facts_substring(&db, query, limit),
        }
    }

    fn search_facts_substring(&self, db: &Connection, query: &str, limit: usize) -> Result<Vec<Fact>> {
        let mut stmt = db.prepare(
            "SELECT id, category, content, source_message_id, confidence, created_at, updated_at, embedding_id
             FROM facts WHERE content LIKE ?1 LIMIT ?2",
        )?;
        let pattern = format!("%{query}%");
        let rows = stmt.query_map(rusqlite::params![pattern, limit], row_to_fact)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Render all facts into a text block for prompt injection, cached
    /// per `conversation_id` for `CACHE_TTL_SECS`.
    pub fn build_context(&self, conversation_id: &str) -> Result<RenderedContext> {
        if let Some(cached) = self.get_cached(conversation_id) {
            return Ok(cached);
        }

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, category, content, source_message_id, confidence, created_at, updated_at, embedding_id
             FROM facts ORDER BY confidence DESC",
        )?;
        let mut facts: Vec<Fact> = stmt.query_map([], row_to_fact)?.filter_map(|r| r.ok()).collect();
        facts.sort_by_key(|f| f.category.priority());

        let rendered = render_context(&facts);
        let ctx = RenderedContext {
            conversation_id: conversation_id.to_string(),
            rendered,
            fact_count: facts.len(),
            built_at: chrono::Utc::now(),
        };

        drop(db);
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= MAX_CACHE_ENTRIES {
            if let Some(oldest) = cache.iter().min_by_key(|(_, v)| v.built_at).map(|(k, _)| k.clone()) {
                cache.remove(&oldest);
            }
        }
        cache.insert(conversation_id.to_string(), ctx.clone());
        Ok(ctx)
    }

    // --- Cost accounting -------------------------------------------------------

    pub fn record_cost(&self, row: &CostRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO cost_rows (timestamp, provider, model, input_tokens, output_tokens,
             cost_usd, channel, skill, conversation_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                row.timestamp,
                row.provider,
                row.model,
                row.input_tokens,
                row.output_tokens,
                row.cost_usd,
                row.channel,
                row.skill,
                row.conversation_id,
            ],
        )?;
        Ok(())
    }

    /// Sum of `cost_usd` for all rows whose UTC date matches `date`
    /// (`YYYY-MM-DD`), used by the LLM router's daily budget check.
    pub fn aggregate_cost_for_date(&self, date: &str) -> Result<f64> {
        let db = self.db.lock().unwrap();
        let total: f64 = db.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_rows WHERE substr(timestamp, 1, 10) = ?1",
            rusqlite::params![date],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Sum of `cost_usd` for rows timestamped within the last `days` days
    /// (inclusive of today), grouped by UTC date — backs the gateway's
    /// `/cost/history` endpoint. Days with no recorded cost are omitted
    /// rather than zero-filled; callers fill the gaps if they need a
    /// dense series.
    pub fn cost_by_day(&self, days: u32) -> Result<Vec<(String, f64)>> {
        let db = self.db.lock().unwrap();
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days as i64))
            .format("%Y-%m-%d")
            .to_string();
        let mut stmt = db.prepare(
            "SELECT substr(timestamp, 1, 10) AS day, COALESCE(SUM(cost_usd), 0.0)
             FROM cost_rows
             WHERE substr(timestamp, 1, 10) >= ?1
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most recently started conversations, newest first — backs the
    /// gateway's `/conversations` listing.
    pub fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<Conversation>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, user_id, started_at, ended_at, summary, token_count
             FROM conversations
             ORDER BY started_at DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit, offset], row_to_conversation)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let db = self.db.lock().unwrap();
        let conversation_count: i64 = db.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
        let message_count: i64 = db.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        let fact_count: i64 = db.query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0))?;
        let total_cost_usd: f64 =
            db.query_row("SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_rows", [], |r| r.get(0))?;
        Ok(MemoryStats {
            conversation_count,
            message_count,
            fact_count,
            total_cost_usd,
        })
    }

    fn get_cached(&self, conversation_id: &str) -> Option<RenderedContext> {
        let cache = self.cache.lock().unwrap();
        let ctx = cache.get(conversation_id)?;
        let age = chrono::Utc::now().signed_duration_since(ctx.built_at).num_seconds();
        if age < CACHE_TTL_SECS {
            Some(ctx.clone())
        } else {
            None
        }
    }

    fn invalidate_all_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

/// Render facts into a text block for prompt injection, truncated to
/// `MAX_CONTEXT_CHARS`. Facts must already be sorted by category priority.
fn render_context(facts: &[Fact]) -> String {
    let mut out = String::with_capacity(MAX_CONTEXT_CHARS);
    let mut current_cat: Option<FactCategory> = None;

    for fact in facts {
        if current_cat != Some(fact.category) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n", capitalize(&fact.category.to_string())));
            current_cat = Some(fact.category);
        }
        let line = format!("- {}\n", fact.content);
        if out.len() + line.len() > MAX_CONTEXT_CHARS {
            break;
        }
        out.push_str(&line);
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        channel: row.get(1)?,
        user_id: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        summary: row.get(5)?,
        token_count: row.get(6)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
        token_count: row.get(5)?,
        embedding_id: row.get(6)?,
    })
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
    let cat_str: String = row.get(1)?;
    Ok(Fact {
        id: row.get(0)?,
        category: cat_str.parse().unwrap_or(FactCategory::Context),
        content: row.get(2)?,
        source_message_id: row.get(3)?,
        confidence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        embedding_id: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn manager() -> MemoryManager {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        MemoryManager::new(conn)
    }

    #[test]
    fn create_then_get_conversation_round_trips() {
        let m = manager();
        m.create_conversation("c1", "gateway", None).unwrap();
        let conv = m.get_conversation("c1").unwrap();
        assert_eq!(conv.channel, "gateway");
        assert!(conv.ended_at.is_none());
    }

    #[test]
    fn messages_are_returned_in_ascending_timestamp_order() {
        let m = manager();
        m.create_conversation("c1", "gateway", None).unwrap();
        m.append_message("c1", "user", "hello", 2).unwrap();
        m.append_message("c1", "assistant", "hi there", 3).unwrap();

        let msgs = m.list_messages("c1", 10, 0).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "hello");
        assert_eq!(msgs[1].content, "hi there");
    }

    #[test]
    fn ending_unknown_conversation_errors() {
        let m = manager();
        assert!(matches!(
            m.end_conversation("missing", None),
            Err(MemoryError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn add_fact_lower_confidence_does_not_overwrite() {
        let m = manager();
        m.add_fact(FactCategory::Preference, "likes tea", None, 0.9).unwrap();
        let fact = m.add_fact(FactCategory::Preference, "likes tea", None, 0.4).unwrap();
        assert_eq!(fact.confidence, 0.9);
    }

    #[test]
    fn facts_by_category_filters_correctly() {
        let m = manager();
        m.add_fact(FactCategory::Identity, "name is Ada", None, 1.0).unwrap();
        m.add_fact(FactCategory::Context, "likes rust", None, 0.7).unwrap();
        let identities = m.get_facts_by_category(FactCategory::Identity).unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].content, "name is Ada");
    }

    #[test]
    fn cost_aggregation_sums_same_day_rows() {
        let m = manager();
        m.record_cost(&CostRow {
            id: 0,
            timestamp: "2026-07-28T10:00:00Z".to_string(),
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.01,
            channel: None,
            skill: None,
            conversation_id: None,
        })
        .unwrap();
        m.record_cost(&CostRow {
            id: 0,
            timestamp: "2026-07-28T22:00:00Z".to_string(),
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            input_tokens: 200,
            output_tokens: 80,
            cost_usd: 0.02,
            channel: None,
            skill: None,
            conversation_id: None,
        })
        .unwrap();

        let total = m.aggregate_cost_for_date("2026-07-28").unwrap();
        assert!((total - 0.03).abs() < 1e-9);
    }

    #[test]
    fn build_context_renders_by_category_priority() {
        let m = manager();
        m.add_fact(FactCategory::Context, "ambient detail", None, 0.5).unwrap();
        m.add_fact(FactCategory::Identity, "name is Ada", None, 1.0).unwrap();
        let ctx = m.build_context("c1").unwrap();
        let identity_pos = ctx.rendered.find("name is Ada").unwrap();
        let context_pos = ctx.rendered.find("ambient detail").unwrap();
        assert!(identity_pos < context_pos);
    }

    #[test]
    fn search_conversations_matches_summary_and_excludes_current() {
        let m = manager();
        m.create_conversation("c1", "gateway", None).unwrap();
        m.create_conversation("c2", "gateway", None).unwrap();
        m.end_conversation("c1", Some("discussed deploying the new release pipeline")).unwrap();
        m.end_conversation("c2", Some("talked about lunch plans")).unwrap();

        let hits = m.search_conversations("release pipeline", "c1", 5).unwrap();
        assert!(hits.is_empty(), "c1 is the excluded conversation and should not match itself");

        let hits = m.search_conversations("release pipeline", "c2", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
    }
}
