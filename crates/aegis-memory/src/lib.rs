//! aegis-memory — component C2: conversation history, durable facts, and
//! LLM cost accounting, backed by SQLite with an FTS5 index over facts.

pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use db::init_db;
pub use error::{MemoryError, Result};
pub use manager::MemoryManager;
pub use types::{Conversation, CostRow, Fact, FactCategory, Message, MemoryStats, RenderedContext};
