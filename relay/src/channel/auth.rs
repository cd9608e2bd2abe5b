//! Authorization Gate
//!
//! Presence check for the `authorize` handshake, shared by both channels.
//! The check is stateless and idempotent: it acknowledges the token but
//! does not gate later handlers, and its outcome never depends on prior
//! messages on the connection.

use crate::connection::protocol::{AuthorizePacket, ServerSignal};
use crate::error::ProtocolError;

/// Check an `authorize` packet and produce the acknowledgment signal.
pub fn authorize(packet: Option<&AuthorizePacket>) -> ServerSignal {
    match packet.and_then(|p| p.token.as_deref()) {
        Some(token) if !token.is_empty() => ServerSignal::AuthSuccess,
        _ => ProtocolError::MissingToken.into(),
    }
}
