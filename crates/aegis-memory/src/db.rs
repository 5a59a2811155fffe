use rusqlite::Connection;

use crate::error::{MemoryError, Result};

/// Current schema version. Bump this and add a branch in `apply_pending`
/// when introducing a new migration — never renumber existing versions.
const SCHEMA_VERSION: i64 = 1;

/// Initialise memory tables and run any pending migrations. Safe to call
/// on every startup: each step is `CREATE TABLE IF NOT EXISTS`, and
/// `apply_pending` is idempotent (running it twice leaves the same
/// version and no duplicate columns).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_schema_version_table(conn)?;
    apply_pending(conn)?;
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    Ok(())
}

fn current_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();
    Ok(version.unwrap_or(0))
}

/// Apply every migration between the on-disk version and `SCHEMA_VERSION`,
/// in strictly increasing order. Bails out loudly rather than silently
/// skipping a gap.
pub fn apply_pending(conn: &Connection) -> Result<()> {
    let mut version = current_version(conn)?;

    if version > SCHEMA_VERSION {
        return Err(MemoryError::MigrationFailed(format!(
            "on-disk schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    while version < SCHEMA_VERSION {
        let next = version + 1;
        match next {
            1 => migrate_v1(conn)?,
            other => {
                return Err(MemoryError::MigrationFailed(format!(
                    "no migration defined for version {other}"
                )))
            }
        }
        version = next;
    }

    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        rusqlite::params![SCHEMA_VERSION],
    )?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            channel     TEXT NOT NULL,
            user_id     TEXT,
            started_at  TEXT NOT NULL,
            ended_at    TEXT,
            summary     TEXT,
            token_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_channel
            ON conversations(channel, started_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            token_count     INTEGER NOT NULL DEFAULT 0,
            embedding_id    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);

        CREATE TABLE IF NOT EXISTS facts (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            category          TEXT NOT NULL,
            content           TEXT NOT NULL,
            source_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
            confidence        REAL NOT NULL DEFAULT 0.8,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            embedding_id      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_facts_category
            ON facts(category);

        CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts
            USING fts5(content, content='facts', content_rowid='id');

        CREATE TABLE IF NOT EXISTS cost_rows (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       TEXT NOT NULL,
            provider        TEXT NOT NULL,
            model           TEXT NOT NULL,
            input_tokens    INTEGER NOT NULL,
            output_tokens   INTEGER NOT NULL,
            cost_usd        REAL NOT NULL,
            channel         TEXT,
            skill           TEXT,
            conversation_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_cost_rows_timestamp
            ON cost_rows(timestamp);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn apply_pending_twice_yields_same_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        apply_pending(&conn).unwrap();
        apply_pending(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
