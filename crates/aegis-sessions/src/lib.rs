//! aegis-sessions — the deterministic conversation-key format that maps a
//! channel/user binding onto the `Conversation` rows `aegis-memory` owns.
//!
//! Persistence for conversations, messages, facts, and cost rows lives in
//! `aegis-memory` so the cascade-on-delete invariant between Conversation
//! and Message can be enforced by a single SQLite connection's foreign
//! keys. This crate only carries the key format.

pub mod error;
pub mod types;

pub use error::{ConversationKeyError, Result};
pub use types::ConversationKey;
