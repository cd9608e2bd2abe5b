//! Beacon Relay Library
//!
//! This crate provides the protocol core for the provider/consumer relay:
//! per-role channel handlers, packet validation, the connection registry,
//! the WebSocket transport and the stimulus driver used to push
//! server-initiated signals at connected clients.

pub mod channel;
pub mod cli;
pub mod connection;
pub mod error;
pub mod registry;
pub mod stimulus;
pub mod validator;

// Re-exports for convenience
pub use channel::consumer::ConsumerChannel;
pub use channel::provider::ProviderChannel;
pub use cli::config::Config;
pub use connection::protocol::{ClientMessage, Packet, ParseError, Role, ServerSignal};
pub use connection::websocket::RelayServer;
pub use error::ProtocolError;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use stimulus::StimulusDriver;
pub use validator::{PacketKind, PacketValidator, SchemaValidator, ValidationError};
