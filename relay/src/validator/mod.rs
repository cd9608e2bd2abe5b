//! Packet Validator
//!
//! Schema checks for `event`, `sensor` and `control` packets. The channel
//! handlers treat the validator as an opaque oracle and only branch on its
//! result, so alternative implementations can be swapped in behind the
//! trait (tests inject scripted ones).

use std::fmt;

use chrono::DateTime;
use thiserror::Error;

use crate::connection::protocol::Packet;

/// Packet kinds subject to schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Event,
    Sensor,
    Control,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Event => write!(f, "event"),
            PacketKind::Sensor => write!(f, "sensor"),
            PacketKind::Control => write!(f, "control"),
        }
    }
}

/// A failed schema check, reported verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Synchronous validation oracle consulted before any packet is heard.
pub trait PacketValidator: Send + Sync {
    fn validate(&self, kind: PacketKind, packet: &Packet) -> Result<(), ValidationError>;
}

/// Default validator. Every kind requires a non-empty `subtype`, a `data`
/// field and an ISO 8601 `t` timestamp; `control` packets must additionally
/// name their target provider.
#[derive(Debug, Default)]
pub struct SchemaValidator;

impl PacketValidator for SchemaValidator {
    fn validate(&self, kind: PacketKind, packet: &Packet) -> Result<(), ValidationError> {
        match packet.subtype.as_deref() {
            Some(subtype) if !subtype.is_empty() => {}
            _ => {
                return Err(ValidationError::new(format!(
                    "`{kind}` packet requires a `subtype`"
                )))
            }
        }

        if packet.data.is_none() {
            return Err(ValidationError::new(format!(
                "`{kind}` packet requires a `data` field"
            )));
        }

        let valid_timestamp = packet
            .timestamp
            .as_deref()
            .is_some_and(|t| DateTime::parse_from_rfc3339(t).is_ok());
        if !valid_timestamp {
            return Err(ValidationError::new(format!(
                "`{kind}` packet requires an ISO 8601 `t` timestamp"
            )));
        }

        if kind == PacketKind::Control {
            match packet.provider.as_deref() {
                Some(provider) if !provider.is_empty() => {}
                _ => {
                    return Err(ValidationError::new(
                        "`control` packet requires a `provider`",
                    ))
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_packet() -> Packet {
        Packet {
            subtype: Some("position".to_string()),
            data: Some(json!([1, 2, 3])),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            ..Packet::default()
        }
    }

    #[test]
    fn test_valid_event_packet_passes() {
        assert!(SchemaValidator
            .validate(PacketKind::Event, &valid_packet())
            .is_ok());
    }

    #[test]
    fn test_missing_subtype_fails() {
        let mut packet = valid_packet();
        packet.subtype = None;

        let err = SchemaValidator
            .validate(PacketKind::Sensor, &packet)
            .unwrap_err();
        assert_eq!(err.to_string(), "`sensor` packet requires a `subtype`");
    }

    #[test]
    fn test_missing_data_fails() {
        let mut packet = valid_packet();
        packet.data = None;

        assert!(SchemaValidator.validate(PacketKind::Event, &packet).is_err());
    }

    #[test]
    fn test_malformed_timestamp_fails() {
        let mut packet = valid_packet();
        packet.timestamp = Some("yesterday".to_string());

        let err = SchemaValidator
            .validate(PacketKind::Event, &packet)
            .unwrap_err();
        assert!(err.to_string().contains("ISO 8601"));
    }

    #[test]
    fn test_control_requires_provider() {
        let packet = valid_packet();
        let err = SchemaValidator
            .validate(PacketKind::Control, &packet)
            .unwrap_err();
        assert_eq!(err.to_string(), "`control` packet requires a `provider`");

        let mut packet = valid_packet();
        packet.provider = Some("p1".to_string());
        assert!(SchemaValidator
            .validate(PacketKind::Control, &packet)
            .is_ok());
    }

    #[test]
    fn test_empty_packet_fails_every_kind() {
        for kind in [PacketKind::Event, PacketKind::Sensor, PacketKind::Control] {
            assert!(SchemaValidator.validate(kind, &Packet::default()).is_err());
        }
    }
}
