//! Connection handling
//!
//! Wire protocol types and the WebSocket relay server.

pub mod protocol;
pub mod websocket;
