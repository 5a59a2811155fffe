use serde::{Deserialize, Serialize};

use crate::error::{ConversationKeyError, Result};

/// Structured key binding a conversation to a channel and, where the
/// channel has one, an external user identity.
///
/// Grounded on the teacher's `SessionKey` (`user:{user_id}:agent:{agent_id}:{name}`),
/// kept as a deterministic format/parse round trip but retargeted from
/// user-centric agent sessions to the channel/user binding spec.md's
/// Conversation lifecycle names: "created on first user message per
/// channel/user binding". `aegis-memory::MemoryManager::get_or_create_conversation`
/// takes this key's formatted string as the Conversation's `id`, so the same
/// channel/user pair always resolves to the same open conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// The channel adapter this conversation is bound to (e.g. `"telegram"`).
    pub channel: String,
    /// The external user identity on that channel, if the channel has one.
    pub user_id: Option<String>,
    /// The conversation slot name (e.g. `"main"` for the default thread).
    pub name: String,
}

impl ConversationKey {
    pub fn new(channel: impl Into<String>, user_id: Option<String>, name: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user_id,
            name: name.into(),
        }
    }

    /// Return the canonical wire-format string.
    ///
    /// Format: `channel:{channel}:user:{user_id}:{name}`, where `{user_id}`
    /// is the literal `-` when absent.
    pub fn format(&self) -> String {
        format!(
            "channel:{}:user:{}:{}",
            self.channel,
            self.user_id.as_deref().unwrap_or("-"),
            self.name
        )
    }

    /// Parse a wire-format key string back into a `ConversationKey`.
    ///
    /// Expects exactly: `channel:<channel>:user:<user_id>:<name>`
    /// where `<name>` may itself contain colons.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s.strip_prefix("channel:").ok_or_else(|| {
            ConversationKeyError::InvalidKey(format!("missing 'channel:' prefix: {s}"))
        })?;

        let user_marker = ":user:";
        let user_pos = rest.find(user_marker).ok_or_else(|| {
            ConversationKeyError::InvalidKey(format!("missing ':user:' segment: {s}"))
        })?;

        let channel = &rest[..user_pos];
        let after_user = &rest[user_pos + user_marker.len()..];

        let colon_pos = after_user.find(':').ok_or_else(|| {
            ConversationKeyError::InvalidKey(format!("missing conversation name segment: {s}"))
        })?;

        let user_id = &after_user[..colon_pos];
        let name = &after_user[colon_pos + 1..];

        if channel.is_empty() || name.is_empty() {
            return Err(ConversationKeyError::InvalidKey(format!(
                "key components must not be empty: {s}"
            )));
        }

        Ok(Self {
            channel: channel.to_string(),
            user_id: if user_id == "-" { None } else { Some(user_id.to_string()) },
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_user() {
        let key = ConversationKey::new("telegram", Some("u-123".to_string()), "main");
        let s = key.format();
        assert_eq!(s, "channel:telegram:user:u-123:main");
        let parsed = ConversationKey::parse(&s).expect("parse failed");
        assert_eq!(parsed, key);
    }

    #[test]
    fn roundtrip_without_user() {
        let key = ConversationKey::new("cli", None, "main");
        let s = key.format();
        let parsed = ConversationKey::parse(&s).expect("parse failed");
        assert_eq!(parsed.user_id, None);
    }

    #[test]
    fn roundtrip_name_with_colons() {
        let key = ConversationKey::new("telegram", Some("u-999".to_string()), "trip:paris:2026");
        let s = key.format();
        let parsed = ConversationKey::parse(&s).expect("parse failed");
        assert_eq!(parsed.name, "trip:paris:2026");
    }

    #[test]
    fn parse_missing_user_marker_returns_err() {
        assert!(ConversationKey::parse("channel:telegram:main").is_err());
    }

    #[test]
    fn parse_missing_channel_prefix_returns_err() {
        assert!(ConversationKey::parse("user:u-1:main").is_err());
    }
}
