//! Consumer Channel Handler
//!
//! Processes inbound `control` packets and the subscription-management
//! actions (`setFilter`, `getState`, `subscribe`, `unsubscribe`,
//! `joinStream`, `leaveStream`) from the consumer socket.
//!
//! The shared structural check and the action-specific field checks in
//! `setFilter`/`getState` both run unconditionally, so a single request
//! can surface two errors. Subscription bookkeeping is intentionally
//! absent: the four subscription actions are acknowledgment-only.

use std::sync::Arc;

use serde_json::Value;

use crate::connection::protocol::{
    FilterRequest, Packet, ProviderScoped, ServerSignal, StateRequest, SubscriptionRequest,
};
use crate::error::ProtocolError;
use crate::validator::{PacketKind, PacketValidator};

/// Handler for one consumer connection. Stateless per invocation: each
/// method returns the ordered signal sequence to send back.
pub struct ConsumerChannel {
    validator: Arc<dyn PacketValidator>,
}

impl ConsumerChannel {
    pub fn new(validator: Arc<dyn PacketValidator>) -> Self {
        Self { validator }
    }

    /// Handle a `control` packet. Valid packets are echoed as
    /// `heard-control`, with a `pong` follow-up for the `ping` subtype.
    pub fn control(&self, packet: Option<Packet>) -> Vec<ServerSignal> {
        let packet = packet.unwrap_or_default();
        if let Err(err) = self.validator.validate(PacketKind::Control, &packet) {
            return vec![err.into()];
        }

        let mut signals = vec![ServerSignal::HeardControl(packet.clone())];
        if packet.subtype.as_deref() == Some("ping") {
            signals.push(ServerSignal::Pong);
        }
        signals
    }

    /// Handle a `setFilter` request. The filter-shape check runs even when
    /// the structural check already failed; both errors may surface.
    pub fn set_filter(&self, packet: Option<FilterRequest>) -> Vec<ServerSignal> {
        let mut signals = vec![check_consumer_packet(packet.as_ref())];

        let has_sequence = packet.as_ref().is_some_and(|p| {
            p.event.as_ref().is_some_and(Value::is_array)
                || p.sensor.as_ref().is_some_and(Value::is_array)
        });
        if has_sequence {
            signals.push(ServerSignal::CheckedPacket("setFilter".to_string()));
        } else {
            signals.push(ProtocolError::InvalidFilter.into());
        }
        signals
    }

    /// Handle a `getState` request. Same non-short-circuiting shape as
    /// `set_filter`: the `subtypes` check always runs.
    pub fn get_state(&self, packet: Option<StateRequest>) -> Vec<ServerSignal> {
        let mut signals = vec![check_consumer_packet(packet.as_ref())];

        let has_subtypes = packet
            .as_ref()
            .is_some_and(|p| !matches!(p.subtypes, None | Some(Value::Null)));
        if has_subtypes {
            signals.push(ServerSignal::CheckedPacket("getState".to_string()));
        } else {
            signals.push(ProtocolError::MissingSubtypes.into());
        }
        signals
    }

    /// Shared body of `subscribe`, `unsubscribe`, `joinStream` and
    /// `leaveStream`: structural validation only, no subscription table.
    pub fn subscription(&self, packet: Option<SubscriptionRequest>) -> Vec<ServerSignal> {
        vec![check_consumer_packet(packet.as_ref())]
    }
}

/// Structural check shared by every consumer action that addresses a
/// provider: the packet must exist and carry a `provider` field.
fn check_consumer_packet<R: ProviderScoped>(packet: Option<&R>) -> ServerSignal {
    let Some(packet) = packet else {
        return ProtocolError::MissingPacket.into();
    };
    match packet.provider() {
        Some(provider) if !provider.is_empty() => {
            ServerSignal::CheckedPacket("consumer".to_string())
        }
        _ => ProtocolError::MissingProvider.into(),
    }
}
