//! Provider Channel Handler
//!
//! Processes inbound `event`, `sensor` and `stream` packets from the
//! provider socket. Every structured packet passes through the validator
//! before it is echoed back as heard; a validation failure produces a
//! single `error` signal and nothing else.

use std::sync::Arc;

use crate::connection::protocol::{Packet, ServerSignal};
use crate::validator::{PacketKind, PacketValidator};

/// Handler for one provider connection. Stateless per invocation: each
/// method returns the ordered signal sequence to send back.
pub struct ProviderChannel {
    validator: Arc<dyn PacketValidator>,
}

impl ProviderChannel {
    pub fn new(validator: Arc<dyn PacketValidator>) -> Self {
        Self { validator }
    }

    /// Handle an `event` packet. Valid packets are echoed as `heard-event`;
    /// the `ping` and `completed` subtypes get a follow-up signal.
    pub fn event(&self, packet: Option<Packet>) -> Vec<ServerSignal> {
        let packet = packet.unwrap_or_default();
        if let Err(err) = self.validator.validate(PacketKind::Event, &packet) {
            return vec![err.into()];
        }

        let mut signals = vec![ServerSignal::HeardEvent(packet.clone())];
        match packet.subtype.as_deref() {
            Some("ping") => signals.push(ServerSignal::Pong),
            Some("completed") => signals.push(ServerSignal::CompletedControl),
            _ => {}
        }
        signals
    }

    /// Handle a `sensor` packet. No subtype branching: valid packets are
    /// echoed as `heard-sensor`.
    pub fn sensor(&self, packet: Option<Packet>) -> Vec<ServerSignal> {
        let packet = packet.unwrap_or_default();
        if let Err(err) = self.validator.validate(PacketKind::Sensor, &packet) {
            return vec![err.into()];
        }
        vec![ServerSignal::HeardSensor(packet)]
    }

    /// Acknowledge a binary stream payload without echoing its content.
    pub fn stream(&self, _payload: &[u8]) -> Vec<ServerSignal> {
        vec![ServerSignal::HeardStream]
    }

    /// A `stream` event arriving on the text channel is not a byte
    /// sequence; it is dropped without an error.
    pub fn stream_text(&self) -> Vec<ServerSignal> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{SchemaValidator, ValidationError};
    use serde_json::json;

    /// Scripted oracle that rejects everything with a fixed message.
    struct RejectAll;

    impl PacketValidator for RejectAll {
        fn validate(&self, _kind: PacketKind, _packet: &Packet) -> Result<(), ValidationError> {
            Err(ValidationError::new("schema mismatch"))
        }
    }

    fn channel() -> ProviderChannel {
        ProviderChannel::new(Arc::new(SchemaValidator))
    }

    fn packet(subtype: &str) -> Packet {
        Packet {
            subtype: Some(subtype.to_string()),
            data: Some(json!("payload")),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            ..Packet::default()
        }
    }

    #[test]
    fn test_event_ping_emits_heard_event_then_pong() {
        let signals = channel().event(Some(packet("ping")));
        assert_eq!(
            signals,
            vec![ServerSignal::HeardEvent(packet("ping")), ServerSignal::Pong]
        );
    }

    #[test]
    fn test_event_completed_emits_completed_control() {
        let signals = channel().event(Some(packet("completed")));
        assert_eq!(
            signals,
            vec![
                ServerSignal::HeardEvent(packet("completed")),
                ServerSignal::CompletedControl,
            ]
        );
    }

    #[test]
    fn test_unrecognized_subtype_is_only_heard() {
        let signals = channel().event(Some(packet("position")));
        assert_eq!(signals, vec![ServerSignal::HeardEvent(packet("position"))]);
    }

    #[test]
    fn test_invalid_event_emits_single_error_and_no_echo() {
        let channel = ProviderChannel::new(Arc::new(RejectAll));
        let signals = channel.event(Some(packet("ping")));
        assert_eq!(signals, vec![ServerSignal::Error(json!("schema mismatch"))]);
    }

    #[test]
    fn test_absent_event_packet_fails_validation() {
        let signals = channel().event(None);
        assert_eq!(signals.len(), 1);
        assert!(matches!(signals[0], ServerSignal::Error(_)));
    }

    #[test]
    fn test_valid_sensor_is_echoed() {
        let signals = channel().sensor(Some(packet("temperature")));
        assert_eq!(
            signals,
            vec![ServerSignal::HeardSensor(packet("temperature"))]
        );
    }

    #[test]
    fn test_invalid_sensor_emits_single_error() {
        let channel = ProviderChannel::new(Arc::new(RejectAll));
        let signals = channel.sensor(Some(packet("temperature")));
        assert_eq!(signals, vec![ServerSignal::Error(json!("schema mismatch"))]);
    }

    #[test]
    fn test_binary_stream_is_heard() {
        assert_eq!(
            channel().stream(&[0xde, 0xad, 0xbe, 0xef]),
            vec![ServerSignal::HeardStream]
        );
    }

    #[test]
    fn test_text_stream_is_silently_ignored() {
        assert!(channel().stream_text().is_empty());
    }
}
