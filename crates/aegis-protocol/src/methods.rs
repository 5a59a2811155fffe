// Well-known WS method names — must match the bundled web client's expectations.

// chat
pub const CHAT_SEND: &str = "chat.send";
pub const CHAT_ABORT: &str = "chat.abort";

// conversations
pub const CONVERSATIONS_LIST: &str = "conversations.list";
pub const CONVERSATIONS_RESOLVE: &str = "conversations.resolve";

// agent
pub const AGENT_STATUS: &str = "agent.status";

// handshake
pub const CONNECT: &str = "connect";
