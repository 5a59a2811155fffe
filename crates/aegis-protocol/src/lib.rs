//! aegis-protocol — the WebSocket wire frames the gateway speaks to its
//! bundled web client: a generic req/res/event envelope plus the
//! connect handshake and well-known method names.

pub mod frames;
pub mod handshake;
pub mod methods;
